//! Message groups and the group assignment table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use exec_core::ExecError;

use crate::routing::RoutingId;

/// Fixed message categories used when a message names no explicit console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageGroup {
    System,
    IoActivity,
    Communications,
    HardwareConfidence,
}

impl MessageGroup {
    pub const ALL: [MessageGroup; 4] = [
        MessageGroup::System,
        MessageGroup::IoActivity,
        MessageGroup::Communications,
        MessageGroup::HardwareConfidence,
    ];

    /// Stable key used by keyins and administration.
    pub fn key(self) -> &'static str {
        match self {
            MessageGroup::System => "SYSMSG",
            MessageGroup::IoActivity => "IOMSG",
            MessageGroup::Communications => "COMMSG",
            MessageGroup::HardwareConfidence => "HWMSG",
        }
    }
}

impl fmt::Display for MessageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MessageGroup {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageGroup::ALL
            .into_iter()
            .find(|g| g.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ExecError::invalid("message group", format!("unknown group '{s}'")))
    }
}

#[derive(Debug, Clone, Default)]
struct Assignment {
    read_only: BTreeSet<RoutingId>,
    read_reply: Option<RoutingId>,
}

/// Per-group console eligibility.
#[derive(Debug, Clone)]
pub struct GroupTable {
    groups: BTreeMap<MessageGroup, Assignment>,
}

impl Default for GroupTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTable {
    pub fn new() -> Self {
        Self {
            groups: MessageGroup::ALL
                .into_iter()
                .map(|g| (g, Assignment::default()))
                .collect(),
        }
    }

    /// Make a system console eligible for every group's read-only traffic.
    /// Groups without a read-reply console adopt this one.
    pub fn add_system_console(&mut self, id: RoutingId) {
        for a in self.groups.values_mut() {
            a.read_only.insert(id);
            if a.read_reply.is_none() {
                a.read_reply = Some(id);
            }
        }
    }

    /// Consoles eligible for read-only messages of `group`.
    pub fn read_only_targets(&self, group: MessageGroup) -> Vec<RoutingId> {
        self.groups
            .get(&group)
            .map(|a| a.read_only.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Console designated for read-reply messages of `group`.
    pub fn read_reply_target(&self, group: MessageGroup) -> Option<RoutingId> {
        self.groups.get(&group).and_then(|a| a.read_reply)
    }

    pub fn add_read_only(&mut self, group: MessageGroup, id: RoutingId) {
        if let Some(a) = self.groups.get_mut(&group) {
            a.read_only.insert(id);
        }
    }

    pub fn set_read_reply(&mut self, group: MessageGroup, id: RoutingId) {
        if let Some(a) = self.groups.get_mut(&group) {
            a.read_only.insert(id);
            a.read_reply = Some(id);
        }
    }

    /// Remove a console from every group. Groups left with no read-only
    /// console, or whose read-reply console was `id`, fall back to
    /// `fallback`. Returns the groups that were reassigned.
    pub fn remove_console(
        &mut self,
        id: RoutingId,
        fallback: Option<RoutingId>,
    ) -> Vec<MessageGroup> {
        let mut reassigned = Vec::new();
        for (group, a) in self.groups.iter_mut() {
            let was_member = a.read_only.remove(&id);
            let was_reply = a.read_reply == Some(id);
            if was_reply {
                a.read_reply = fallback;
            }
            let emptied = was_member && a.read_only.is_empty();
            if let Some(fb) = fallback {
                if emptied || was_reply {
                    a.read_only.insert(fb);
                    reassigned.push(*group);
                }
            }
        }
        reassigned
    }

    /// Whether every group has a read-reply console and at least one
    /// read-only console.
    pub fn is_complete(&self) -> bool {
        self.groups
            .values()
            .all(|a| a.read_reply.is_some() && !a.read_only.is_empty())
    }
}
