//! # exec-console
//!
//! Console message routing for the executive: routing ids, message groups,
//! the console interface contract, read-only and read-reply requests, and
//! the [`ConsoleRouter`] that moves traffic between them.

pub mod buffer;
pub mod group;
pub mod interface;
pub mod request;
pub mod router;
pub mod routing;
pub mod stdio;

pub use buffer::{BufferConsole, Prompt};
pub use group::{GroupTable, MessageGroup};
pub use interface::{
    ConsoleInput, ConsoleInterface, ConsoleKind, ConsoleLog, ConsoleLogEntry, ConsoleLogKind,
    MessageId,
};
pub use request::{Destination, Owner, ReadReply, ReplyOutcome};
pub use router::{ConsoleRouter, KeyinRequest, PollOutcome, RouterStats};
pub use routing::RoutingId;
pub use stdio::StdioConsole;
