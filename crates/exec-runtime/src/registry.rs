//! # Run registry
//!
//! Owns every run, keyed by unique name, and drives runs through
//!
//! ```text
//! IN_BACKLOG ─► ACTIVE ─► FIN ─┬─► RSI_TERM ──(session ends)──► RSI_DETACHED ─┐
//!                              └────────────────────────────────────────────────┴─► SMOQUE ─► destroyed
//! ```
//!
//! Pins are only ever taken under the registry lock (or by cloning an
//! existing pin), so the sweep's check of `pin_count() == 0` under that same
//! lock cannot race a new pin.

use chrono::Local;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use exec_console::{ConsoleRouter, Destination, MessageGroup, RoutingId};
use exec_core::{EventBus, ExecError, ExecEvent, Result, StopCode, ident};

use crate::facilities::{Facilities, OutputQueue};
use crate::naming;
use crate::run::{PinnedRun, RunBody, RunCell, RunInfo, RunKind, RunSpec, RunState, RunStatus};

/// What one reclamation sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub closed: usize,
    pub advanced: usize,
    pub destroyed: usize,
}

impl SweepReport {
    pub fn did_work(&self) -> bool {
        self.closed + self.advanced + self.destroyed > 0
    }
}

pub struct RunRegistry {
    runs: Mutex<BTreeMap<String, Arc<RunCell>>>,
    router: Arc<ConsoleRouter>,
    bus: EventBus,
    facilities: Arc<dyn Facilities>,
    output: Arc<dyn OutputQueue>,
    notice_timestamps: bool,
    name_limit: Option<usize>,
}

impl RunRegistry {
    pub fn new(
        router: Arc<ConsoleRouter>,
        bus: EventBus,
        facilities: Arc<dyn Facilities>,
        output: Arc<dyn OutputQueue>,
    ) -> Self {
        Self {
            runs: Mutex::new(BTreeMap::new()),
            router,
            bus,
            facilities,
            output,
            notice_timestamps: false,
            name_limit: None,
        }
    }

    /// Append an `HH:MM:SS` stamp to START and FIN notices.
    pub fn with_notice_timestamps(mut self, enabled: bool) -> Self {
        self.notice_timestamps = enabled;
        self
    }

    /// Cap the renamed candidates tried for a duplicate run-id.
    pub fn with_name_limit(mut self, limit: Option<usize>) -> Self {
        self.name_limit = limit;
        self
    }

    pub fn router(&self) -> &Arc<ConsoleRouter> {
        &self.router
    }

    pub fn facilities(&self) -> &Arc<dyn Facilities> {
        &self.facilities
    }

    // ── Creation and lookup ────────────────────────────────────

    /// Validate, name, and register a new run. The run comes back pinned.
    ///
    /// Batch runs start in the backlog; every other kind starts active.
    pub fn create_run(&self, spec: RunSpec) -> Result<PinnedRun> {
        ident::validate_run_id(&spec.run_id)?;
        ident::validate_account_id(&spec.account)?;
        ident::validate_project_id(&spec.project)?;
        ident::validate_user_id(&spec.user)?;

        let base = spec.run_id.to_ascii_uppercase();
        let kind = spec.kind;
        let initial = match kind {
            RunKind::Batch => RunState::InBacklog,
            _ => RunState::Active,
        };

        let run = {
            let mut runs = self.runs.lock();
            let limit = self.name_limit.map_or(runs.len() + 1, |cap| cap.min(runs.len() + 1));
            let name = naming::unique_name(&base, limit, |n| runs.contains_key(n))
                .inspect_err(|e| error!(run_id = %base, error = %e, "cannot generate a unique run name"))?;
            let cell = Arc::new(RunCell::new(name.clone(), spec, initial));
            let pinned = PinnedRun::pin(&cell);
            runs.insert(name, cell);
            pinned
        };

        if run.name() != base {
            self.notice(
                &run,
                format!("{} DUPLICATED NEW ID IS {}", run.original_name(), run.name()),
            );
        }
        self.notice(&run, format!("{} START{}", run.name(), self.stamp()));

        info!(run = %run.name(), original = %run.original_name(), kind = kind.label(), "run created");
        self.bus.publish(ExecEvent::RunCreated {
            name: run.name().to_string(),
            original: run.original_name().to_string(),
            run_kind: kind.label().to_string(),
        });
        Ok(run)
    }

    /// Look a run up without pinning it. The handle may outlive the run's
    /// registration; only identity fields are meaningful after that.
    pub fn lookup(&self, name: &str) -> Option<Arc<RunCell>> {
        self.runs.lock().get(&name.to_ascii_uppercase()).cloned()
    }

    /// Look a run up and pin it in one step.
    pub fn pin(&self, name: &str) -> Option<PinnedRun> {
        self.runs
            .lock()
            .get(&name.to_ascii_uppercase())
            .map(PinnedRun::pin)
    }

    /// Registered run names in stable order.
    pub fn names(&self) -> Vec<String> {
        self.runs.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runs.lock().contains_key(&name.to_ascii_uppercase())
    }

    pub fn runs(&self) -> Vec<RunInfo> {
        self.snapshot().iter().map(|(_, cell)| cell.info()).collect()
    }

    /// Runs with a statement still executing.
    pub fn executing_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|(_, cell)| {
                cell.body()
                    .activity
                    .as_ref()
                    .is_some_and(|h| !h.is_finished())
            })
            .count()
    }

    fn snapshot(&self) -> Vec<(String, Arc<RunCell>)> {
        self.runs
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    // ── Transitions ────────────────────────────────────────────

    /// Admit a backlogged run.
    pub fn activate(&self, run: &PinnedRun) -> bool {
        self.move_if(run, &[RunState::InBacklog], RunState::Active)
    }

    /// Finish a run normally. No effect once the run is past `ACTIVE`.
    pub fn finish_run(&self, run: &PinnedRun) -> bool {
        self.move_if(run, &[RunState::InBacklog, RunState::Active], RunState::Fin)
    }

    /// Mark a run aborted and finish it. A statement still executing is left
    /// to complete; closeout waits for it.
    pub fn abort_run(&self, run: &PinnedRun, reason: &str) {
        let change = {
            let mut body = run.body();
            body.status = RunStatus::Abort;
            match body.state {
                RunState::InBacklog | RunState::Active => Some(set_state(&mut body, RunState::Fin)),
                _ => None,
            }
        };
        warn!(run = %run.name(), reason, "run aborted");
        self.notice(run, format!("{} ABORTED {}", run.name(), reason));
        if let Some((from, to)) = change {
            self.announce(run, from, to);
        }
    }

    /// The session behind a demand run has gone away.
    pub fn end_session(&self, run: &PinnedRun) -> bool {
        if !run.kind().is_demand() {
            return false;
        }
        let change = {
            let mut body = run.body();
            body.detached = true;
            match body.state {
                RunState::RsiTerm => Some(set_state(&mut body, RunState::RsiDetached)),
                RunState::InBacklog | RunState::Active => Some(set_state(&mut body, RunState::Fin)),
                RunState::Fin => None,
                _ => return false,
            }
        };
        debug!(run = %run.name(), "session ended");
        if let Some((from, to)) = change {
            self.announce(run, from, to);
        }
        true
    }

    /// End the session of every demand run bound to the console at `routing`.
    /// Returns the number of runs affected.
    pub fn end_sessions_on(&self, routing: RoutingId) -> usize {
        let bound: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter(|(_, cell)| cell.kind() == RunKind::Demand { session: Some(routing) })
            .map(|(name, _)| name)
            .collect();
        bound
            .iter()
            .filter_map(|name| self.pin(name))
            .filter(|run| self.end_session(run))
            .count()
    }

    fn move_if(&self, run: &PinnedRun, from: &[RunState], to: RunState) -> bool {
        let change = {
            let mut body = run.body();
            if !from.contains(&body.state) {
                return false;
            }
            set_state(&mut body, to)
        };
        self.announce(run, change.0, change.1);
        true
    }

    fn announce(&self, run: &RunCell, from: RunState, to: RunState) {
        debug!(run = %run.name(), %from, %to, "run state changed");
        self.bus.publish(ExecEvent::RunStateChanged {
            name: run.name().to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    // ── Closeout ───────────────────────────────────────────────

    /// Close a finished run exactly once: FIN notice, tailsheet for
    /// control-mode runs, and release of every assigned facility item.
    /// Returns the number of items released.
    pub fn close_run(&self, run: &PinnedRun) -> usize {
        let status = {
            let mut body = run.body();
            if body.closed {
                return 0;
            }
            body.closed = true;
            body.status
        };

        self.notice(
            run,
            format!("{} FIN{}{}", run.name(), status.notice_suffix(), self.stamp()),
        );
        if run.kind().is_control_mode() {
            self.print_tailsheet(run, status);
        }

        let mut released = Vec::new();
        loop {
            let item = {
                let mut body = run.body();
                if body.facilities.is_empty() {
                    break;
                }
                body.facilities.remove(0)
            };
            if let Err(e) = self.facilities.release(run.name(), &item) {
                warn!(run = %run.name(), item = %item.name, error = %e, "facility release failed");
            }
            released.push(item.name);
        }
        run.body()
            .use_names
            .retain(|_, target| !released.contains(target));

        info!(run = %run.name(), %status, released = released.len(), "run closed");
        self.bus.publish(ExecEvent::RunClosed {
            name: run.name().to_string(),
            status: status.to_string(),
            released_items: released.len(),
        });
        released.len()
    }

    fn print_tailsheet(&self, run: &PinnedRun, status: RunStatus) {
        let counters = run.counters();
        let wait_secs = counters.resource_wait_ms / 1000;
        run.io().eject();
        for line in [
            format!("RUN {} ({}) {}", run.name(), run.original_name(), status.to_string().to_uppercase()),
            format!("ACCOUNT {} PROJECT {} USER {}", run.account(), run.project(), run.user()),
            format!("IMAGES READ {}", counters.images_read),
            format!("PAGES PRINTED {}", counters.pages_printed),
            format!(
                "RESOURCE WAIT {:02}:{:02}:{:02}.{:03}",
                wait_secs / 3600,
                wait_secs / 60 % 60,
                wait_secs % 60,
                counters.resource_wait_ms % 1000
            ),
            format!("DISK TRANSFERS {}", counters.disk_transfers),
            format!("TAPE TRANSFERS {}", counters.tape_transfers),
        ] {
            run.print(&line);
        }
    }

    // ── Reclamation ────────────────────────────────────────────

    /// One pass over every run, advancing finished runs one step and
    /// destroying reclaimable ones.
    ///
    /// A run in `SMOQUE` that still holds facility items was assigned
    /// something after closeout. That is an internal consistency violation.
    pub fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for (key, cell) in self.snapshot() {
            match cell.state() {
                RunState::InBacklog | RunState::RsiTerm => {}
                RunState::Active => {
                    let mut body = cell.body();
                    if body.activity.as_ref().is_some_and(|h| h.is_finished()) {
                        body.activity = None;
                    }
                }
                RunState::Fin => {
                    let Some(run) = self.pin(&key) else { continue };
                    if run.body().activity.as_ref().is_some_and(|h| !h.is_finished()) {
                        continue;
                    }
                    self.close_run(&run);
                    let change = {
                        let mut body = run.body();
                        body.activity = None;
                        let next = if run.kind().is_demand() && !body.detached {
                            RunState::RsiTerm
                        } else {
                            RunState::Smoque
                        };
                        set_state(&mut body, next)
                    };
                    self.announce(&run, change.0, change.1);
                    report.closed += 1;
                }
                RunState::RsiDetached => {
                    let Some(run) = self.pin(&key) else { continue };
                    if self.move_if(&run, &[RunState::RsiDetached], RunState::Smoque) {
                        report.advanced += 1;
                    }
                }
                RunState::Smoque => {
                    let held = cell.body().facilities.len();
                    if held > 0 {
                        error!(run = %key, held, "facility items held after closeout");
                        return Err(ExecError::Stopped(StopCode::InternalConsistency));
                    }
                    if self.output.has_queued_output(&key) {
                        continue;
                    }
                    if self.destroy_if_idle(&key, &cell) {
                        report.destroyed += 1;
                    }
                }
            }
        }

        if report.did_work() {
            debug!(
                closed = report.closed,
                advanced = report.advanced,
                destroyed = report.destroyed,
                "sweep complete"
            );
        }
        Ok(report)
    }

    fn destroy_if_idle(&self, key: &str, cell: &Arc<RunCell>) -> bool {
        let removed = {
            let mut runs = self.runs.lock();
            let reclaimable = runs.get(key).is_some_and(|c| Arc::ptr_eq(c, cell))
                && cell.pin_count() == 0
                && cell.state() == RunState::Smoque;
            reclaimable && runs.remove(key).is_some()
        };
        if removed {
            info!(run = %key, "run destroyed");
            self.bus.publish(ExecEvent::RunDestroyed {
                name: key.to_string(),
            });
        }
        removed
    }

    // ── Notices ────────────────────────────────────────────────

    fn stamp(&self) -> String {
        if self.notice_timestamps {
            format!(" {}", Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }

    /// A demand run's notices go to its session console. Every other notice,
    /// and any whose session console is gone, goes to the system group.
    fn notice(&self, run: &PinnedRun, text: String) {
        let destination = match run.kind() {
            RunKind::Demand { session: Some(id) } => Destination::console(id),
            _ => Destination::group(MessageGroup::System),
        };
        self.router.post_read_only(destination, text, run.owner());
    }
}

fn set_state(body: &mut RunBody, to: RunState) -> (RunState, RunState) {
    let from = body.state;
    body.state = to;
    (from, to)
}
