use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::RoutingId;

/// Router-issued identifier correlating a read-reply message with its reply.
pub type MessageId = u64;

/// The two console families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    /// Operator-facing; eligible for every message group.
    System,
    /// One interactive session; only receives traffic addressed to it.
    Session,
}

/// Something a console has collected from its operator or session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Input nobody asked for (an operator keyin).
    Unsolicited(String),
    /// Answer to an outstanding read-reply message.
    Reply { message_id: MessageId, text: String },
}

/// A display endpoint registered with the console router.
///
/// Every method is a non-blocking poll primitive: a console that cannot
/// take a message right now returns `false` rather than waiting.
pub trait ConsoleInterface: Send + Sync {
    /// Unique console name.
    fn name(&self) -> &str;

    fn kind(&self) -> ConsoleKind;

    /// Display a message that expects no answer.
    fn post_read_only(&self, text: &str) -> bool;

    /// Display a message that expects an answer of at most `max_reply_len`
    /// characters, tagged with `message_id`.
    fn post_read_reply(&self, message_id: MessageId, text: &str, max_reply_len: u8) -> bool;

    /// Withdraw an outstanding read-reply message.
    fn cancel_read_reply(&self, message_id: MessageId);

    /// Read-reply messages displayed and not yet answered or cancelled.
    fn outstanding_read_replies(&self) -> usize;

    /// Maximum concurrent outstanding read-reply messages.
    fn read_reply_limit(&self) -> usize;

    /// Take the next piece of collected input, if any.
    fn poll_input(&self) -> Option<ConsoleInput>;

    fn has_spare_capacity(&self) -> bool {
        self.outstanding_read_replies() < self.read_reply_limit()
    }
}

// ── Console log ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLogKind {
    ReadOnly,
    ReadReply,
    Reply,
}

/// One console interaction recorded against the run that caused it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleLogEntry {
    pub at: DateTime<Utc>,
    pub kind: ConsoleLogKind,
    pub routing: Option<RoutingId>,
    pub text: String,
}

impl ConsoleLogEntry {
    pub fn new(kind: ConsoleLogKind, routing: Option<RoutingId>, text: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            kind,
            routing,
            text: text.into(),
        }
    }
}

/// Receives the console log entries of messages a run owns.
pub trait ConsoleLog: Send + Sync {
    fn record_console(&self, entry: ConsoleLogEntry);
}
