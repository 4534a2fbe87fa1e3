use serde::{Deserialize, Serialize};
use std::fmt;

use exec_core::fieldata;

/// 36-bit routing identifier of a registered console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingId(u64);

impl RoutingId {
    /// Reserved for the main (first) system console.
    pub const MAIN: RoutingId = RoutingId(0o01);

    pub fn new(value: u64) -> Self {
        Self(value & fieldata::WORD_MASK)
    }

    /// Routing value of a session console: its name, left-justified and
    /// space-filled to six characters, packed as Fieldata. The same name
    /// always yields the same value.
    pub fn for_session(name: &str) -> Self {
        Self(fieldata::pack_word(name))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_main(self) -> bool {
        self == Self::MAIN
    }
}

impl fmt::Display for RoutingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02o}", self.0)
    }
}
