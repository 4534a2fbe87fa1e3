//! Sleep seam for the polling loops.
//!
//! The scheduler and the console router sleep only after a pass that did
//! nothing. Going through [`Pacer`] lets tests count those sleeps instead of
//! waiting on the wall clock.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Suspend the calling loop for roughly `duration`.
    async fn pause(&self, duration: Duration);
}

/// Real sleeping via the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Pacer that records every pause and only yields to the runtime.
#[derive(Debug, Default, Clone)]
pub struct CountingPacer {
    pauses: Arc<AtomicUsize>,
}

impl CountingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pauses requested so far.
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self, _duration: Duration) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}
