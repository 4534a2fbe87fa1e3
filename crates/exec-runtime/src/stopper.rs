use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use exec_console::ConsoleRouter;
use exec_core::{EventBus, ExecEvent, StopCode};

struct StopState {
    code: Mutex<Option<StopCode>>,
    token: CancellationToken,
    router: Arc<ConsoleRouter>,
    bus: EventBus,
}

/// Shared handle to the executive's stop routine.
///
/// The first stop code wins; later requests are logged and ignored.
#[derive(Clone)]
pub struct Stopper {
    inner: Arc<StopState>,
}

impl Stopper {
    pub fn new(router: Arc<ConsoleRouter>, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(StopState {
                code: Mutex::new(None),
                token: CancellationToken::new(),
                router,
                bus,
            }),
        }
    }

    /// Request an executive stop. Returns `true` if this call set the code.
    pub fn stop(&self, code: StopCode) -> bool {
        {
            let mut current = self.inner.code.lock();
            if let Some(first) = *current {
                info!(requested = %code, recorded = %first, "stop already in progress");
                return false;
            }
            *current = Some(code);
        }
        if code.is_fault() {
            error!(code = code.code(), message = code.message(), "executive stop");
        } else {
            info!(code = code.code(), message = code.message(), "executive stop");
        }
        self.inner.router.notify_system(format!("EXEC STOP {code}"));
        self.inner.bus.publish(ExecEvent::StopRequested {
            code,
            at: Utc::now(),
        });
        self.inner.token.cancel();
        true
    }

    pub fn code(&self) -> Option<StopCode> {
        *self.inner.code.lock()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Cancelled once a stop has been requested.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub async fn stopped(&self) -> Option<StopCode> {
        self.inner.token.cancelled().await;
        self.code()
    }
}
