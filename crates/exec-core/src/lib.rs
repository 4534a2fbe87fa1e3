//! # exec-core
//!
//! Shared vocabulary of the executive: the error type, fatal stop codes,
//! identifier grammars, the Fieldata character code, the event bus, and
//! the sleep seam shared by the polling loops.

pub mod error;
pub mod event;
pub mod fieldata;
pub mod ident;
pub mod pacer;
pub mod stop;

pub use error::{ExecError, Result};
pub use event::{EventBus, ExecEvent};
pub use ident::IdentKind;
pub use pacer::{CountingPacer, Pacer, TokioPacer};
pub use stop::StopCode;
