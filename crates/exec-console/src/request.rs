use parking_lot::Mutex;
use std::sync::Weak;
use tokio::sync::Notify;

use crate::group::MessageGroup;
use crate::interface::{ConsoleLog, ConsoleLogEntry, MessageId};
use crate::routing::RoutingId;

/// Where a console message should go: an explicit console when one is
/// given and registered, otherwise the consoles of `group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub routing: Option<RoutingId>,
    pub group: MessageGroup,
}

impl Destination {
    pub fn group(group: MessageGroup) -> Self {
        Self {
            routing: None,
            group,
        }
    }

    /// Address one console, falling back to the System group if it is not
    /// registered.
    pub fn console(routing: RoutingId) -> Self {
        Self {
            routing: Some(routing),
            group: MessageGroup::System,
        }
    }

    pub fn with_group(mut self, group: MessageGroup) -> Self {
        self.group = group;
        self
    }
}

/// Weak handle to the run a message belongs to.
pub type Owner = Option<Weak<dyn ConsoleLog>>;

pub(crate) fn record(owner: &Owner, entry: ConsoleLogEntry) {
    if let Some(log) = owner.as_ref().and_then(Weak::upgrade) {
        log.record_console(entry);
    }
}

/// Fire-and-forget console output.
pub(crate) struct ReadOnlyRequest {
    pub seq: u64,
    pub destination: Destination,
    pub text: String,
    pub owner: Owner,
}

/// How a read-reply request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Completed(String),
    Cancelled,
}

#[derive(Debug, Default)]
struct ReplyState {
    console: Option<RoutingId>,
    message_id: Option<MessageId>,
    response: Option<String>,
    completed: bool,
    cancelled: bool,
}

/// Console output that expects a bounded-length reply.
///
/// Shared between the router and whoever posted it; the poster may drop
/// its handle at any time once the request is completed or cancelled.
pub struct ReadReply {
    destination: Destination,
    text: String,
    max_reply_len: u8,
    owner: Owner,
    state: Mutex<ReplyState>,
    notify: Notify,
}

impl std::fmt::Debug for ReadReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadReply")
            .field("destination", &self.destination)
            .field("text", &self.text)
            .field("max_reply_len", &self.max_reply_len)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl ReadReply {
    pub(crate) fn new(destination: Destination, text: String, max_reply_len: u8, owner: Owner) -> Self {
        Self {
            destination,
            text,
            max_reply_len,
            owner,
            state: Mutex::new(ReplyState::default()),
            notify: Notify::new(),
        }
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn max_reply_len(&self) -> u8 {
        self.max_reply_len
    }

    pub(crate) fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Console and message id this request is currently displayed under.
    pub fn assignment(&self) -> Option<(RoutingId, MessageId)> {
        let s = self.state.lock();
        s.console.zip(s.message_id)
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn response(&self) -> Option<String> {
        self.state.lock().response.clone()
    }

    /// Completed or cancelled.
    pub fn is_resolved(&self) -> bool {
        let s = self.state.lock();
        s.completed || s.cancelled
    }

    pub(crate) fn is_unassigned(&self) -> bool {
        let s = self.state.lock();
        s.console.is_none() && !s.completed && !s.cancelled
    }

    pub(crate) fn is_assigned_to(&self, console: RoutingId, message_id: MessageId) -> bool {
        let s = self.state.lock();
        s.console == Some(console) && s.message_id == Some(message_id)
    }

    pub(crate) fn bind(&self, console: RoutingId, message_id: MessageId) -> bool {
        let mut s = self.state.lock();
        if s.completed || s.cancelled || s.console.is_some() {
            return false;
        }
        s.console = Some(console);
        s.message_id = Some(message_id);
        true
    }

    /// Detach from `console` so the next poll assigns it elsewhere.
    pub(crate) fn unbind_from(&self, console: RoutingId) -> bool {
        let mut s = self.state.lock();
        if s.console == Some(console) && !s.completed {
            s.console = None;
            s.message_id = None;
            return true;
        }
        false
    }

    pub(crate) fn complete(&self, response: String) {
        {
            let mut s = self.state.lock();
            if s.completed || s.cancelled {
                return;
            }
            s.response = Some(response);
            s.completed = true;
        }
        self.notify.notify_waiters();
    }

    /// Mark cancelled unless already completed. Returns the assignment the
    /// console should be told to withdraw.
    pub(crate) fn cancel(&self) -> Option<(RoutingId, MessageId)> {
        let assignment = {
            let mut s = self.state.lock();
            if s.completed || s.cancelled {
                return None;
            }
            s.cancelled = true;
            s.console.zip(s.message_id)
        };
        self.notify.notify_waiters();
        assignment
    }

    fn outcome(&self) -> Option<ReplyOutcome> {
        let s = self.state.lock();
        if s.completed {
            Some(ReplyOutcome::Completed(s.response.clone().unwrap_or_default()))
        } else if s.cancelled {
            Some(ReplyOutcome::Cancelled)
        } else {
            None
        }
    }

    /// Suspend the caller until the request is completed or cancelled.
    pub async fn wait(&self) -> ReplyOutcome {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}
