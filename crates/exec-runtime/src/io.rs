//! Run input/output seam.
//!
//! Every read is a non-blocking poll: a source with nothing to offer
//! answers [`ReadOutcome::NotReady`] instead of waiting.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Result of asking a run's input source for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Image(String),
    BadFormat,
    ControlImageOnly,
    EndOfFile,
    IoError(String),
    NotReady,
    Partial,
}

/// Input source and print stream of one run.
pub trait RunIo: Send + Sync {
    fn read_image(&self) -> ReadOutcome;

    fn print(&self, line: &str);

    /// Start a new page.
    fn eject(&self);
}

#[derive(Debug, Default)]
struct QueueState {
    input: VecDeque<ReadOutcome>,
    closed: bool,
    output: Vec<String>,
    ejects: usize,
}

/// In-memory run I/O.
///
/// An open queue answers `NotReady` when empty, like a terminal waiting on
/// its user; a closed queue answers `EndOfFile`.
#[derive(Debug, Default)]
pub struct QueueIo {
    state: Mutex<QueueState>,
}

impl QueueIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// A finite control stream that reports end of file once drained.
    pub fn batch<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let io = Self::new();
        for line in lines {
            io.feed(line);
        }
        io.close_input();
        io
    }

    pub fn feed(&self, line: impl Into<String>) {
        self.feed_outcome(ReadOutcome::Image(line.into()));
    }

    /// Queue an arbitrary read outcome.
    pub fn feed_outcome(&self, outcome: ReadOutcome) {
        self.state.lock().input.push_back(outcome);
    }

    pub fn close_input(&self) {
        self.state.lock().closed = true;
    }

    pub fn pending_input(&self) -> usize {
        self.state.lock().input.len()
    }

    /// Everything printed so far.
    pub fn output(&self) -> Vec<String> {
        self.state.lock().output.clone()
    }

    pub fn ejects(&self) -> usize {
        self.state.lock().ejects
    }
}

impl RunIo for QueueIo {
    fn read_image(&self) -> ReadOutcome {
        let mut state = self.state.lock();
        match state.input.pop_front() {
            Some(outcome) => outcome,
            None if state.closed => ReadOutcome::EndOfFile,
            None => ReadOutcome::NotReady,
        }
    }

    fn print(&self, line: &str) {
        self.state.lock().output.push(line.to_string());
    }

    fn eject(&self) {
        self.state.lock().ejects += 1;
    }
}

/// Print stream that discards everything and never has input. Used by the
/// executive's own run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIo;

impl RunIo for NullIo {
    fn read_image(&self) -> ReadOutcome {
        ReadOutcome::NotReady
    }

    fn print(&self, _line: &str) {}

    fn eject(&self) {}
}
