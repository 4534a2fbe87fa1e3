//! Control-statement interpreter seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use exec_console::ConsoleRouter;

use crate::facilities::Facilities;
use crate::registry::RunRegistry;
use crate::run::PinnedRun;

/// A complete, syntactically valid control statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub label: Option<String>,
    /// Upper-cased statement name, without the `@`.
    pub mnemonic: String,
    /// Option letters following the mnemonic's comma, if any.
    pub options: String,
    /// Comma-separated operand fields, trimmed.
    pub fields: Vec<String>,
    /// Full statement text with continuations joined.
    pub text: String,
}

/// What the interpreter made of the pending statement images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// Not an executive control statement; a processor call.
    NotControlStatement,
    /// More images are needed to complete the statement.
    Continued,
    Error(String),
    Parsed(ParsedStatement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Ok,
    /// Puts the run into error mode.
    Error,
    /// Aborts the run.
    Abort,
}

/// Result of executing one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementOutcome {
    pub status: StatementStatus,
    /// Lines to print on the run's output.
    pub output: Vec<String>,
}

impl StatementOutcome {
    pub fn ok() -> Self {
        Self {
            status: StatementStatus::Ok,
            output: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StatementStatus::Error,
            output: vec![message.into()],
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self {
            status: StatementStatus::Abort,
            output: vec![message.into()],
        }
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.output.push(line.into());
        self
    }
}

/// Everything a statement may act on.
#[derive(Clone)]
pub struct StatementContext {
    pub run: PinnedRun,
    pub registry: Arc<RunRegistry>,
    pub router: Arc<ConsoleRouter>,
    pub facilities: Arc<dyn Facilities>,
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Examine the pending images of one run. Pure; never blocks.
    fn interpret(&self, images: &[String]) -> Interpretation;

    /// Carry out a parsed statement against its run.
    async fn execute(&self, statement: &ParsedStatement, ctx: &StatementContext) -> StatementOutcome;
}
