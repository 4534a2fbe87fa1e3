//! Collaborator seams: file facilities, deferred output, and task policy.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use exec_core::{ExecError, Result};

use crate::run::RunCell;

/// A file assigned to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityItem {
    pub id: u64,
    /// `QUALIFIER*FILENAME`, upper-cased.
    pub name: String,
}

/// Grants and releases file assignments.
pub trait Facilities: Send + Sync {
    fn assign(&self, run: &str, name: &str) -> Result<FacilityItem>;

    fn release(&self, run: &str, item: &FacilityItem) -> Result<()>;
}

/// Whether a finished run still has output waiting to be printed.
pub trait OutputQueue: Send + Sync {
    fn has_queued_output(&self, run: &str) -> bool;
}

/// No deferred output subsystem: finished runs are destroyed immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeferredOutput;

impl OutputQueue for NoDeferredOutput {
    fn has_queued_output(&self, _run: &str) -> bool {
        false
    }
}

/// Hook for task management to demand a run be terminated before its next
/// control statement.
pub trait TaskPolicy: Send + Sync {
    fn must_terminate(&self, run: &RunCell) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoTaskPolicy;

impl TaskPolicy for NoTaskPolicy {
    fn must_terminate(&self, _run: &RunCell) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct TableState {
    assigned: BTreeMap<u64, (String, String)>,
    denied: BTreeSet<String>,
    failing_release: BTreeSet<String>,
    released: Vec<(String, String)>,
}

/// In-memory facility table.
///
/// A file may be assigned to one run at a time. Names can be marked as
/// denied (assignment fails) or as failing on release, to exercise error
/// paths.
#[derive(Debug, Default)]
pub struct FacilityTable {
    next_id: AtomicU64,
    state: Mutex<TableState>,
}

impl FacilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, name: &str) {
        self.state.lock().denied.insert(name.to_ascii_uppercase());
    }

    pub fn fail_release(&self, name: &str) {
        self.state
            .lock()
            .failing_release
            .insert(name.to_ascii_uppercase());
    }

    /// Number of files currently assigned to `run`.
    pub fn assigned_to(&self, run: &str) -> usize {
        self.state
            .lock()
            .assigned
            .values()
            .filter(|(r, _)| r == run)
            .count()
    }

    /// Every `(run, file)` release attempted so far, in order.
    pub fn releases(&self) -> Vec<(String, String)> {
        self.state.lock().released.clone()
    }
}

impl Facilities for FacilityTable {
    fn assign(&self, run: &str, name: &str) -> Result<FacilityItem> {
        let name = name.to_ascii_uppercase();
        let mut state = self.state.lock();
        if state.denied.contains(&name) {
            return Err(ExecError::Facility {
                item: name,
                reason: "assignment denied".into(),
            });
        }
        if let Some((holder, _)) = state.assigned.values().find(|(_, n)| *n == name) {
            if holder != run {
                return Err(ExecError::Facility {
                    reason: format!("assigned to {holder}"),
                    item: name,
                });
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        state.assigned.insert(id, (run.to_string(), name.clone()));
        Ok(FacilityItem { id, name })
    }

    fn release(&self, run: &str, item: &FacilityItem) -> Result<()> {
        let mut state = self.state.lock();
        state.released.push((run.to_string(), item.name.clone()));
        state.assigned.remove(&item.id);
        if state.failing_release.contains(&item.name) {
            return Err(ExecError::Facility {
                item: item.name.clone(),
                reason: "release failed".into(),
            });
        }
        Ok(())
    }
}
