use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::stop::StopCode;

/// Events published by the executive subsystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecEvent {
    // ── Run lifecycle ──────────────────────────────────────────
    RunCreated {
        name: String,
        original: String,
        run_kind: String,
    },
    RunStateChanged {
        name: String,
        from: String,
        to: String,
    },
    RunClosed {
        name: String,
        status: String,
        released_items: usize,
    },
    RunDestroyed {
        name: String,
    },

    // ── Console lifecycle ──────────────────────────────────────
    ConsoleRegistered {
        name: String,
        routing: u64,
        system: bool,
    },
    ConsoleUnregistered {
        name: String,
        routing: u64,
    },
    GroupReassigned {
        group: String,
        routing: u64,
    },

    // ── System ─────────────────────────────────────────────────
    StopRequested {
        code: StopCode,
        at: DateTime<Utc>,
    },
    Shutdown,
}

/// A broadcast-based event bus for executive-wide notifications.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ExecEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: ExecEvent) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
