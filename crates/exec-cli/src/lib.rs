//! # exec-cli
//!
//! Command-line interface for the executive.
//!
//! ## Commands
//!
//! - `execd start`: Boot the executive with a terminal operator console
//! - `execd config`: Show the effective configuration
//! - `execd check-id`: Check a value against an identifier grammar
//! - `execd version`: Show version and build info
//! - `execd completions`: Generate shell completions

pub mod commands;

pub use commands::Cli;
