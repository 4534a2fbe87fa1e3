//! # exec-runtime
//!
//! Runs and the machinery that drives them: the run registry and its
//! lifecycle, the control-mode scheduler with its statement executors, the
//! collaborator seams (interpreter, facilities, deferred output, task
//! policy), and the [`Executive`] that boots and stops it all.

pub mod basic;
pub mod executive;
pub mod executor;
pub mod facilities;
pub mod interpreter;
pub mod io;
pub mod keyin;
pub mod naming;
pub mod registry;
pub mod run;
pub mod scheduler;
pub mod signal;
pub mod stopper;

pub use basic::BasicInterpreter;
pub use executive::{Collaborators, Executive};
pub use executor::StatementExecutor;
pub use facilities::{
    Facilities, FacilityItem, FacilityTable, NoDeferredOutput, NoTaskPolicy, OutputQueue,
    TaskPolicy,
};
pub use interpreter::{
    Interpretation, Interpreter, ParsedStatement, StatementContext, StatementOutcome,
    StatementStatus,
};
pub use io::{NullIo, QueueIo, ReadOutcome, RunIo};
pub use keyin::KeyinHandler;
pub use registry::{RunRegistry, SweepReport};
pub use run::{PinnedRun, RunCell, RunCounters, RunInfo, RunKind, RunSpec, RunState, RunStatus};
pub use scheduler::{ControlModeScheduler, PassReport, SchedulerSettings};
pub use stopper::Stopper;
