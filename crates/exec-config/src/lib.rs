//! # exec-config
//!
//! Configuration system for the executive. Reads from `execd.toml` and
//! environment variables, with CLI overrides applied by the caller.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::ExecConfig;
pub use schema::{ConfigWarning, ConsoleConfig, ExecutiveConfig, LoggingConfig, SchedulerConfig, WarningSeverity};
