//! Operator console on the process's standard streams.
//!
//! Read-reply messages are shown as `<id>-<text>`; the operator answers
//! with `<id> <reply>`. Any other line is treated as a keyin.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::interface::{ConsoleInput, ConsoleInterface, ConsoleKind, MessageId};

pub struct StdioConsole {
    name: String,
    read_reply_limit: usize,
    prompts: Mutex<BTreeMap<MessageId, u8>>,
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl StdioConsole {
    /// Create the console and start the stdin reader task. Must be called
    /// from within a tokio runtime.
    pub fn spawn(name: impl Into<String>, read_reply_limit: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        });
        Self {
            name: name.into(),
            read_reply_limit,
            prompts: Mutex::new(BTreeMap::new()),
            lines: Mutex::new(rx),
        }
    }

    fn write_line(&self, line: &str) -> bool {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").and_then(|_| out.flush()).is_ok()
    }

    fn parse(&self, line: String) -> ConsoleInput {
        let mut prompts = self.prompts.lock();
        if let Some((id, rest)) = line.trim_start().split_once(char::is_whitespace) {
            if let Ok(message_id) = id.parse::<MessageId>() {
                if let Some(max) = prompts.remove(&message_id) {
                    let text: String = rest.trim().chars().take(max as usize).collect();
                    return ConsoleInput::Reply { message_id, text };
                }
            }
        }
        ConsoleInput::Unsolicited(line.trim().to_string())
    }
}

impl ConsoleInterface for StdioConsole {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConsoleKind {
        ConsoleKind::System
    }

    fn post_read_only(&self, text: &str) -> bool {
        self.write_line(text)
    }

    fn post_read_reply(&self, message_id: MessageId, text: &str, max_reply_len: u8) -> bool {
        if self.prompts.lock().len() >= self.read_reply_limit {
            return false;
        }
        if !self.write_line(&format!("{message_id}-{text}")) {
            return false;
        }
        self.prompts.lock().insert(message_id, max_reply_len);
        true
    }

    fn cancel_read_reply(&self, message_id: MessageId) {
        if self.prompts.lock().remove(&message_id).is_some() {
            self.write_line(&format!("{message_id}-CANCELLED"));
        }
    }

    fn outstanding_read_replies(&self) -> usize {
        self.prompts.lock().len()
    }

    fn read_reply_limit(&self) -> usize {
        self.read_reply_limit
    }

    fn poll_input(&self) -> Option<ConsoleInput> {
        let line = self.lines.lock().try_recv().ok()?;
        if line.trim().is_empty() {
            return None;
        }
        Some(self.parse(line))
    }
}
