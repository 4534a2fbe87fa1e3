//! The Run model.
//!
//! A run lives in the registry as an `Arc<RunCell>`. Identity fields are
//! immutable; everything else sits behind the cell's body lock and is
//! reachable for writing only through a [`PinnedRun`], whose existence
//! keeps the reclamation sweep from destroying the run.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

use exec_console::{ConsoleLog, ConsoleLogEntry, Owner, RoutingId};

use crate::facilities::FacilityItem;
use crate::io::{NullIo, RunIo};

// ── State, status, kind ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    InBacklog,
    Active,
    /// Finished, closeout pending.
    Fin,
    /// Closed demand run waiting for its session to end.
    RsiTerm,
    /// Session gone; nothing left but reclamation.
    RsiDetached,
    /// Waiting for deferred output before destruction.
    Smoque,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::InBacklog => "IN_BACKLOG",
            RunState::Active => "ACTIVE",
            RunState::Fin => "FIN",
            RunState::RsiTerm => "RSI_TERM",
            RunState::RsiDetached => "RSI_DETACHED",
            RunState::Smoque => "SMOQUE",
        }
    }

    /// Past `ACTIVE`: no more statements will be processed.
    pub fn is_finished(self) -> bool {
        !matches!(self, RunState::InBacklog | RunState::Active)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NoError,
    Error,
    Abort,
}

impl RunStatus {
    /// Suffix appended to the FIN notice.
    pub fn notice_suffix(self) -> &'static str {
        match self {
            RunStatus::NoError => "",
            RunStatus::Error => " ERROR",
            RunStatus::Abort => " ABORT",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::NoError => "no_error",
            RunStatus::Error => "error",
            RunStatus::Abort => "abort",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunKind {
    /// The executive's own pseudo-run.
    Exec,
    /// An interactive session, optionally bound to a session console.
    Demand { session: Option<RoutingId> },
    Batch,
    /// Transaction program run.
    Tip,
}

impl RunKind {
    pub fn label(self) -> &'static str {
        match self {
            RunKind::Exec => "exec",
            RunKind::Demand { .. } => "demand",
            RunKind::Batch => "batch",
            RunKind::Tip => "tip",
        }
    }

    /// Whether the run reads a control-statement stream.
    pub fn is_control_mode(self) -> bool {
        matches!(self, RunKind::Demand { .. } | RunKind::Batch)
    }

    pub fn is_demand(self) -> bool {
        matches!(self, RunKind::Demand { .. })
    }
}

// ── Creation request ───────────────────────────────────────────

/// What a caller asks for when creating a run.
#[derive(Clone)]
pub struct RunSpec {
    pub run_id: String,
    pub account: String,
    pub project: String,
    pub user: String,
    pub kind: RunKind,
    pub io: Arc<dyn RunIo>,
}

impl RunSpec {
    pub fn new(
        kind: RunKind,
        run_id: impl Into<String>,
        account: impl Into<String>,
        project: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            account: account.into(),
            project: project.into(),
            user: user.into(),
            kind,
            io: Arc::new(NullIo),
        }
    }

    pub fn with_io(mut self, io: Arc<dyn RunIo>) -> Self {
        self.io = io;
        self
    }
}

impl fmt::Debug for RunSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSpec")
            .field("run_id", &self.run_id)
            .field("account", &self.account)
            .field("project", &self.project)
            .field("user", &self.user)
            .field("kind", &self.kind)
            .finish()
    }
}

// ── Mutable body ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub images_read: u64,
    pub pages_printed: u64,
    pub resource_wait_ms: u64,
    pub disk_transfers: u64,
    pub tape_transfers: u64,
}

#[derive(Debug)]
pub(crate) struct RunBody {
    pub state: RunState,
    pub status: RunStatus,
    pub error_mode: bool,
    pub detached: bool,
    pub images: Vec<String>,
    pub console_log: Vec<ConsoleLogEntry>,
    pub counters: RunCounters,
    pub activity: Option<JoinHandle<()>>,
    pub skip_count: u32,
    pub skip_label: Option<String>,
    pub data_ignored_reported: bool,
    pub lines_on_page: u32,
    pub facilities: Vec<FacilityItem>,
    pub use_names: BTreeMap<String, String>,
    pub closed: bool,
}

impl RunBody {
    fn new(state: RunState) -> Self {
        Self {
            state,
            status: RunStatus::NoError,
            error_mode: false,
            detached: false,
            images: Vec::new(),
            console_log: Vec::new(),
            counters: RunCounters::default(),
            activity: None,
            skip_count: 0,
            skip_label: None,
            data_ignored_reported: false,
            lines_on_page: 0,
            facilities: Vec::new(),
            use_names: BTreeMap::new(),
            closed: false,
        }
    }
}

// ── Run cell ───────────────────────────────────────────────────

/// One registered run.
pub struct RunCell {
    name: String,
    original: String,
    account: String,
    project: String,
    user: String,
    kind: RunKind,
    created_at: DateTime<Utc>,
    io: Arc<dyn RunIo>,
    pins: AtomicUsize,
    body: Mutex<RunBody>,
}

impl RunCell {
    pub(crate) fn new(name: String, spec: RunSpec, state: RunState) -> Self {
        Self {
            name,
            original: spec.run_id,
            account: spec.account,
            project: spec.project,
            user: spec.user,
            kind: spec.kind,
            created_at: Utc::now(),
            io: spec.io,
            pins: AtomicUsize::new(0),
            body: Mutex::new(RunBody::new(state)),
        }
    }

    /// Unique name the run is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run-id as requested, before disambiguation.
    pub fn original_name(&self) -> &str {
        &self.original
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn io(&self) -> &Arc<dyn RunIo> {
        &self.io
    }

    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RunState {
        self.body.lock().state
    }

    pub fn status(&self) -> RunStatus {
        self.body.lock().status
    }

    pub fn is_detached(&self) -> bool {
        self.body.lock().detached
    }

    pub(crate) fn body(&self) -> MutexGuard<'_, RunBody> {
        self.body.lock()
    }

    pub fn info(&self) -> RunInfo {
        let body = self.body.lock();
        RunInfo {
            name: self.name.clone(),
            original: self.original.clone(),
            kind: self.kind.label().to_string(),
            state: body.state,
            status: body.status,
            pins: self.pin_count(),
            error_mode: body.error_mode,
            executing: body.activity.is_some(),
            facilities: body.facilities.len(),
            counters: body.counters.clone(),
        }
    }
}

impl fmt::Debug for RunCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunCell")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pins", &self.pin_count())
            .finish_non_exhaustive()
    }
}

impl ConsoleLog for RunCell {
    fn record_console(&self, entry: ConsoleLogEntry) {
        self.body.lock().console_log.push(entry);
    }
}

/// Point-in-time view of a run for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub name: String,
    pub original: String,
    pub kind: String,
    pub state: RunState,
    pub status: RunStatus,
    pub pins: usize,
    pub error_mode: bool,
    pub executing: bool,
    pub facilities: usize,
    pub counters: RunCounters,
}

// ── Pinned handle ──────────────────────────────────────────────

/// A pinned reference to a run. The run cannot be destroyed while any
/// `PinnedRun` exists; dropping the handle unpins.
pub struct PinnedRun {
    cell: Arc<RunCell>,
}

impl PinnedRun {
    /// Callers must hold the registry lock, or already hold a pin.
    pub(crate) fn pin(cell: &Arc<RunCell>) -> Self {
        cell.pins.fetch_add(1, Ordering::SeqCst);
        Self {
            cell: Arc::clone(cell),
        }
    }

    pub fn cell(&self) -> &Arc<RunCell> {
        &self.cell
    }

    /// Weak console-log owner for messages this run posts.
    pub fn owner(&self) -> Owner {
        let log: Arc<dyn ConsoleLog> = self.cell.clone();
        Some(Arc::downgrade(&log) as Weak<dyn ConsoleLog>)
    }

    pub fn error_mode(&self) -> bool {
        self.cell.body().error_mode
    }

    pub fn set_error_mode(&self) {
        let mut body = self.cell.body();
        body.error_mode = true;
        if body.status == RunStatus::NoError {
            body.status = RunStatus::Error;
        }
    }

    /// Pending statement images, oldest first.
    pub fn images(&self) -> Vec<String> {
        self.cell.body().images.clone()
    }

    pub fn clear_images(&self) {
        self.cell.body().images.clear();
    }

    pub fn skip_count(&self) -> u32 {
        self.cell.body().skip_count
    }

    pub fn set_skip_count(&self, count: u32) {
        self.cell.body().skip_count = count;
    }

    pub fn skip_label(&self) -> Option<String> {
        self.cell.body().skip_label.clone()
    }

    pub fn set_skip_label(&self, label: Option<String>) {
        self.cell.body().skip_label = label;
    }

    /// Print a line on the run's output.
    pub fn print(&self, line: &str) {
        self.cell.io.print(line);
    }

    pub fn counters(&self) -> RunCounters {
        self.cell.body().counters.clone()
    }

    pub fn add_transfers(&self, disk: u64, tape: u64) {
        let mut body = self.cell.body();
        body.counters.disk_transfers += disk;
        body.counters.tape_transfers += tape;
    }

    pub fn console_log(&self) -> Vec<ConsoleLogEntry> {
        self.cell.body().console_log.clone()
    }

    pub fn facility_items(&self) -> Vec<FacilityItem> {
        self.cell.body().facilities.clone()
    }

    pub fn add_facility(&self, item: FacilityItem) {
        self.cell.body().facilities.push(item);
    }

    /// Remove the item assigned under `name` along with any use-names that
    /// point at it.
    pub fn take_facility(&self, name: &str) -> Option<FacilityItem> {
        let mut body = self.cell.body();
        let pos = body
            .facilities
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))?;
        let item = body.facilities.remove(pos);
        body.use_names.retain(|_, target| !target.eq_ignore_ascii_case(&item.name));
        Some(item)
    }

    pub fn bind_use_name(&self, alias: &str, target: &str) {
        self.cell
            .body()
            .use_names
            .insert(alias.to_ascii_uppercase(), target.to_ascii_uppercase());
    }

    pub fn use_names(&self) -> BTreeMap<String, String> {
        self.cell.body().use_names.clone()
    }

    /// Resolve a use-name to the file it stands for.
    pub fn resolve_name(&self, name: &str) -> String {
        let upper = name.to_ascii_uppercase();
        self.cell
            .body()
            .use_names
            .get(&upper)
            .cloned()
            .unwrap_or(upper)
    }
}

impl Clone for PinnedRun {
    fn clone(&self) -> Self {
        Self::pin(&self.cell)
    }
}

impl Drop for PinnedRun {
    fn drop(&mut self) {
        self.cell.pins.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Deref for PinnedRun {
    type Target = RunCell;

    fn deref(&self) -> &RunCell {
        &self.cell
    }
}

impl fmt::Debug for PinnedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PinnedRun").field(&self.cell.name).finish()
    }
}
