use serde::{Deserialize, Serialize};
use std::fmt;

/// Fatal conditions that halt the executive.
///
/// Every component escalates unrecoverable conditions through one of these
/// codes; the executive records the first one it sees and shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCode {
    /// No unique run name could be generated.
    RunNameExhausted,
    /// A structural inconsistency was found (registry, router tables).
    InternalConsistency,
    /// A subsystem failed to start during boot.
    ManagerStartFailure,
    /// Someone tried to remove the main console while running.
    MainConsoleUnregistered,
    /// Operator-requested shutdown.
    OperatorShutdown,
}

impl StopCode {
    pub const ALL: [StopCode; 5] = [
        StopCode::RunNameExhausted,
        StopCode::InternalConsistency,
        StopCode::ManagerStartFailure,
        StopCode::MainConsoleUnregistered,
        StopCode::OperatorShutdown,
    ];

    /// Numeric stop code, shown in octal on the console.
    pub fn code(self) -> u8 {
        match self {
            StopCode::RunNameExhausted => 0o013,
            StopCode::InternalConsistency => 0o040,
            StopCode::ManagerStartFailure => 0o041,
            StopCode::MainConsoleUnregistered => 0o042,
            StopCode::OperatorShutdown => 0o077,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            StopCode::RunNameExhausted => "DUPLICATE RUN NAME EXHAUSTION",
            StopCode::InternalConsistency => "INTERNAL CONSISTENCY VIOLATION",
            StopCode::ManagerStartFailure => "MANAGER START FAILURE",
            StopCode::MainConsoleUnregistered => "MAIN CONSOLE UNREGISTERED",
            StopCode::OperatorShutdown => "OPERATOR SHUTDOWN",
        }
    }

    /// Whether this stop represents a fault rather than a requested shutdown.
    pub fn is_fault(self) -> bool {
        !matches!(self, StopCode::OperatorShutdown)
    }
}

impl fmt::Display for StopCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o} {}", self.code(), self.message())
    }
}
