//! In-memory console.
//!
//! Keeps a transcript of everything displayed and lets the caller type
//! replies and keyins. Used for headless operation and by the tests.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};

use crate::interface::{ConsoleInput, ConsoleInterface, ConsoleKind, MessageId};

/// A read-reply message currently displayed and awaiting an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub message_id: MessageId,
    pub text: String,
    pub max_reply_len: u8,
}

#[derive(Debug)]
struct BufferState {
    accepting: bool,
    displayed: Vec<String>,
    prompts: BTreeMap<MessageId, Prompt>,
    input: VecDeque<ConsoleInput>,
    cancelled: Vec<MessageId>,
}

pub struct BufferConsole {
    name: String,
    kind: ConsoleKind,
    read_reply_limit: usize,
    state: Mutex<BufferState>,
}

impl BufferConsole {
    pub fn new(name: impl Into<String>, kind: ConsoleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            read_reply_limit: 4,
            state: Mutex::new(BufferState {
                accepting: true,
                displayed: Vec::new(),
                prompts: BTreeMap::new(),
                input: VecDeque::new(),
                cancelled: Vec::new(),
            }),
        }
    }

    pub fn new_system(name: impl Into<String>) -> Self {
        Self::new(name, ConsoleKind::System)
    }

    pub fn new_session(name: impl Into<String>) -> Self {
        Self::new(name, ConsoleKind::Session)
    }

    pub fn with_read_reply_limit(mut self, limit: usize) -> Self {
        self.read_reply_limit = limit;
        self
    }

    /// While not accepting, every post is refused.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    /// Every message displayed so far, read-only and read-reply alike.
    pub fn displayed(&self) -> Vec<String> {
        self.state.lock().displayed.clone()
    }

    /// Outstanding read-reply messages, oldest first.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.state.lock().prompts.values().cloned().collect()
    }

    /// Message ids withdrawn by the router.
    pub fn cancelled_ids(&self) -> Vec<MessageId> {
        self.state.lock().cancelled.clone()
    }

    /// Answer an outstanding prompt. The reply is cut to the prompt's
    /// maximum length. Returns `false` if no such prompt is displayed.
    pub fn reply(&self, message_id: MessageId, text: &str) -> bool {
        let mut state = self.state.lock();
        let Some(prompt) = state.prompts.remove(&message_id) else {
            return false;
        };
        let text: String = text.chars().take(prompt.max_reply_len as usize).collect();
        state.input.push_back(ConsoleInput::Reply { message_id, text });
        true
    }

    /// Answer the oldest outstanding prompt.
    pub fn answer_oldest(&self, text: &str) -> Option<MessageId> {
        let id = self.state.lock().prompts.keys().next().copied()?;
        self.reply(id, text).then_some(id)
    }

    /// Queue unsolicited operator input.
    pub fn type_keyin(&self, text: impl Into<String>) {
        self.state
            .lock()
            .input
            .push_back(ConsoleInput::Unsolicited(text.into()));
    }
}

impl ConsoleInterface for BufferConsole {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConsoleKind {
        self.kind
    }

    fn post_read_only(&self, text: &str) -> bool {
        let mut state = self.state.lock();
        if !state.accepting {
            return false;
        }
        state.displayed.push(text.to_string());
        true
    }

    fn post_read_reply(&self, message_id: MessageId, text: &str, max_reply_len: u8) -> bool {
        let mut state = self.state.lock();
        if !state.accepting || state.prompts.len() >= self.read_reply_limit {
            return false;
        }
        state.displayed.push(text.to_string());
        state.prompts.insert(
            message_id,
            Prompt {
                message_id,
                text: text.to_string(),
                max_reply_len,
            },
        );
        true
    }

    fn cancel_read_reply(&self, message_id: MessageId) {
        let mut state = self.state.lock();
        if state.prompts.remove(&message_id).is_some() {
            state.cancelled.push(message_id);
        }
    }

    fn outstanding_read_replies(&self) -> usize {
        self.state.lock().prompts.len()
    }

    fn read_reply_limit(&self) -> usize {
        self.read_reply_limit
    }

    fn poll_input(&self) -> Option<ConsoleInput> {
        self.state.lock().input.pop_front()
    }
}
