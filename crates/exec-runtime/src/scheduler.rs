//! # Control-mode scheduler
//!
//! Gives every active batch or demand run a chance to advance its control
//! statement stream, one image per run per pass. A pass in which some run
//! made progress is followed straight away by the next; only a pass in
//! which nothing moved sleeps.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use exec_console::ConsoleRouter;
use exec_core::{Pacer, StopCode};

use crate::executor::StatementExecutor;
use crate::facilities::{Facilities, TaskPolicy};
use crate::interpreter::{Interpretation, Interpreter, StatementContext};
use crate::io::ReadOutcome;
use crate::registry::RunRegistry;
use crate::run::{PinnedRun, RunKind, RunState};
use crate::stopper::Stopper;

/// First character of every control statement.
pub const CONTROL_MARKER: char = '@';

pub const DATA_IGNORED: &str = "DATA IGNORED";
pub const PROCESSOR_NOT_FOUND: &str = "PROCESSOR NOT FOUND";

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub idle_sleep: Duration,
    pub page_length: u32,
    pub sweep_every_passes: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_millis(100),
            page_length: 60,
            sweep_every_passes: 1,
        }
    }
}

/// What one pass over the registry did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub visited: usize,
    pub progressed: usize,
}

pub struct ControlModeScheduler {
    registry: Arc<RunRegistry>,
    router: Arc<ConsoleRouter>,
    interpreter: Arc<dyn Interpreter>,
    facilities: Arc<dyn Facilities>,
    policy: Arc<dyn TaskPolicy>,
    pacer: Arc<dyn Pacer>,
    settings: SchedulerSettings,
    stopper: Option<Stopper>,
}

impl ControlModeScheduler {
    pub fn new(
        registry: Arc<RunRegistry>,
        interpreter: Arc<dyn Interpreter>,
        policy: Arc<dyn TaskPolicy>,
        pacer: Arc<dyn Pacer>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            router: Arc::clone(registry.router()),
            facilities: Arc::clone(registry.facilities()),
            registry,
            interpreter,
            policy,
            pacer,
            settings,
            stopper: None,
        }
    }

    /// Where fatal sweep failures are escalated.
    pub fn with_stopper(mut self, stopper: Stopper) -> Self {
        self.stopper = Some(stopper);
        self
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    // ── Per-run step ───────────────────────────────────────────

    /// Advance one run by at most one image. Returns whether the run made
    /// progress.
    pub fn process_run(&self, run: &PinnedRun) -> bool {
        if run.state() != RunState::Active || !run.kind().is_control_mode() {
            return false;
        }

        {
            let mut body = run.body();
            if let Some(activity) = &body.activity {
                if !activity.is_finished() {
                    return false;
                }
                body.activity = None;
            }
        }

        if self.policy.must_terminate(run) {
            self.registry.abort_run(run, "TASK ERROR TERMINATION");
            return true;
        }

        let image = match run.io().read_image() {
            ReadOutcome::Image(image) => image,
            ReadOutcome::EndOfFile => {
                self.end_of_input(run);
                return true;
            }
            ReadOutcome::IoError(e) => {
                warn!(run = %run.name(), error = %e, "control stream read failed");
                return false;
            }
            other => {
                debug!(run = %run.name(), outcome = ?other, "no image this pass");
                return false;
            }
        };

        let interpretation = {
            let mut body = run.body();
            body.counters.images_read += 1;
            let continuing = !body.images.is_empty();
            if !continuing && !image.starts_with(CONTROL_MARKER) {
                let report = !body.data_ignored_reported;
                body.data_ignored_reported = true;
                drop(body);
                if report {
                    run.print(DATA_IGNORED);
                }
                return true;
            }
            body.data_ignored_reported = false;
            body.images.push(image);
            self.interpreter.interpret(&body.images)
        };

        match interpretation {
            Interpretation::NotControlStatement => {
                // Processor calls are not dispatched here.
                run.print(PROCESSOR_NOT_FOUND);
                run.set_error_mode();
                run.clear_images();
                true
            }
            Interpretation::Continued => true,
            Interpretation::Error(message) => {
                for image in run.images() {
                    run.print(&image);
                }
                run.print(&message);
                run.set_error_mode();
                run.clear_images();
                true
            }
            Interpretation::Parsed(statement) => {
                if self.skip(run, statement.label.as_deref()) {
                    run.clear_images();
                    return true;
                }
                if run.kind() == RunKind::Batch {
                    self.echo(run);
                }
                let ctx = StatementContext {
                    run: run.clone(),
                    registry: Arc::clone(&self.registry),
                    router: Arc::clone(&self.router),
                    facilities: Arc::clone(&self.facilities),
                };
                let executor =
                    StatementExecutor::new(statement, Arc::clone(&self.interpreter), ctx);
                let handle = tokio::spawn(executor.run());
                run.body().activity = Some(handle);
                true
            }
        }
    }

    /// Apply the skip count, then the skip label. Returns `true` if the
    /// statement is to be skipped.
    fn skip(&self, run: &PinnedRun, label: Option<&str>) -> bool {
        let mut body = run.body();
        if body.skip_count > 0 {
            body.skip_count -= 1;
            return true;
        }
        match (&body.skip_label, label) {
            (None, _) => false,
            (Some(wanted), Some(label)) if wanted.eq_ignore_ascii_case(label) => {
                body.skip_label = None;
                false
            }
            (Some(_), _) => true,
        }
    }

    /// Print the pending images, ejecting when the page fills.
    fn echo(&self, run: &PinnedRun) {
        let images = run.images();
        for image in &images {
            let eject = {
                let mut body = run.body();
                body.lines_on_page += 1;
                if self.settings.page_length > 0 && body.lines_on_page > self.settings.page_length {
                    body.lines_on_page = 1;
                    body.counters.pages_printed += 1;
                    true
                } else {
                    false
                }
            };
            if eject {
                run.io().eject();
            }
            run.print(image);
        }
    }

    fn end_of_input(&self, run: &PinnedRun) {
        match run.kind() {
            RunKind::Demand { .. } => {
                debug!(run = %run.name(), "terminal disconnected");
                self.registry.end_session(run);
            }
            _ => {
                debug!(run = %run.name(), "end of control stream");
                self.registry.finish_run(run);
            }
        }
    }

    // ── Passes ─────────────────────────────────────────────────

    /// Visit every run in a snapshot taken now. Runs that disappear
    /// mid-pass are skipped.
    pub fn pass(&self) -> PassReport {
        let mut report = PassReport::default();
        for name in self.registry.names() {
            let Some(run) = self.registry.pin(&name) else {
                continue;
            };
            report.visited += 1;
            if self.process_run(&run) {
                report.progressed += 1;
            }
        }
        report
    }

    /// Run passes until cancelled. The registry is swept every
    /// `sweep_every_passes` passes; a failed sweep stops the executive.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        info!(
            idle_sleep_ms = self.settings.idle_sleep.as_millis() as u64,
            "control-mode scheduler started"
        );
        let sweep_every = u64::from(self.settings.sweep_every_passes.max(1));
        let mut passes: u64 = 0;

        while !token.is_cancelled() {
            let report = self.pass();
            passes += 1;

            if passes % sweep_every == 0 {
                if let Err(e) = self.registry.sweep() {
                    let code = e.stop_code().unwrap_or(StopCode::InternalConsistency);
                    match &self.stopper {
                        Some(stopper) => {
                            stopper.stop(code);
                        }
                        None => warn!(error = %e, "sweep failed"),
                    }
                    break;
                }
            }

            if report.progressed > 0 {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.pacer.pause(self.settings.idle_sleep) => {}
            }
        }
        info!(passes, "control-mode scheduler stopped");
    }
}
