use thiserror::Error;

use crate::stop::StopCode;

/// Unified error type for the executive.
#[derive(Error, Debug)]
pub enum ExecError {
    // ── Run errors ─────────────────────────────────────────────
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("unique run name space exhausted starting from {0}")]
    NameSpaceExhausted(String),

    // ── Console errors ─────────────────────────────────────────
    #[error("console already registered: {0}")]
    DuplicateConsole(String),

    #[error("console name already in use: {0}")]
    DuplicateConsoleName(String),

    #[error("console not registered: {0}")]
    ConsoleNotFound(String),

    #[error("main console {0} cannot be unregistered while the executive is running")]
    MainConsoleInUse(String),

    #[error("console router is stopped")]
    RouterStopped,

    // ── Collaborator errors ────────────────────────────────────
    #[error("facility error: {item}: {reason}")]
    Facility { item: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Executive ──────────────────────────────────────────────
    #[error("executive stopped: {0}")]
    Stopped(StopCode),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ExecError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// The stop code this error escalates to, if it is system-fatal.
    pub fn stop_code(&self) -> Option<StopCode> {
        match self {
            Self::NameSpaceExhausted(_) => Some(StopCode::RunNameExhausted),
            Self::MainConsoleInUse(_) => Some(StopCode::MainConsoleUnregistered),
            Self::Stopped(code) => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
