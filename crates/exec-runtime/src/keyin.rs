//! Minimal operator keyins.
//!
//! | Keyin      | Effect                                   |
//! |------------|------------------------------------------|
//! | `SS`       | list every run with its state and status |
//! | `AB name`  | abort a run                              |
//! | `$!`       | stop the executive                       |

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use exec_console::{ConsoleRouter, Destination, KeyinRequest};
use exec_core::StopCode;

use crate::registry::RunRegistry;
use crate::stopper::Stopper;

pub struct KeyinHandler {
    registry: Arc<RunRegistry>,
    router: Arc<ConsoleRouter>,
    stopper: Stopper,
}

impl KeyinHandler {
    pub fn new(registry: Arc<RunRegistry>, stopper: Stopper) -> Self {
        Self {
            router: Arc::clone(registry.router()),
            registry,
            stopper,
        }
    }

    fn reply(&self, keyin: &KeyinRequest, text: impl Into<String>) {
        self.router
            .post_read_only(Destination::console(keyin.routing), text, None);
    }

    pub fn handle(&self, keyin: &KeyinRequest) {
        let text = keyin.text.trim().to_ascii_uppercase();
        let (verb, operand) = match text.split_once(char::is_whitespace) {
            Some((v, o)) => (v, o.trim()),
            None => (text.as_str(), ""),
        };
        debug!(console = %keyin.console, keyin = %text, "keyin");

        match verb {
            "SS" => {
                let runs = self.registry.runs();
                if runs.is_empty() {
                    self.reply(keyin, "NO RUNS");
                }
                for run in runs {
                    self.reply(
                        keyin,
                        format!("{} {} {} {}", run.name, run.kind.to_uppercase(), run.state, run.status.to_string().to_uppercase()),
                    );
                }
            }
            "AB" if !operand.is_empty() => match self.registry.pin(operand) {
                Some(run) => self.registry.abort_run(&run, "BY OPERATOR"),
                None => self.reply(keyin, format!("RUN {operand} NOT FOUND")),
            },
            "$!" => {
                info!(console = %keyin.console, "operator requested stop");
                self.stopper.stop(StopCode::OperatorShutdown);
            }
            _ => self.reply(keyin, format!("KEYIN NOT RECOGNIZED: {text}")),
        }
    }

    /// Handle keyins until cancelled or the channel closes.
    pub async fn serve(self, mut rx: mpsc::Receiver<KeyinRequest>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                keyin = rx.recv() => match keyin {
                    Some(keyin) => self.handle(&keyin),
                    None => break,
                },
            }
        }
        debug!("keyin handler stopped");
    }
}
