//! # Executive
//!
//! Top-level owner of the running system. Boots subsystems in dependency
//! order and tears them down in reverse:
//!
//! ```text
//! boot:      router ─► registry ─► exec run ─► scheduler ─► keyins
//! shutdown:  keyins, scheduler ─► executing statements ─► runs ─► router
//!            ─► statements released by the router ─► runs ─► consoles
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use exec_config::ExecConfig;
use exec_console::{ConsoleInterface, ConsoleRouter, RoutingId};
use exec_core::{EventBus, ExecError, ExecEvent, Pacer, Result, StopCode, TokioPacer};

use crate::basic::BasicInterpreter;
use crate::facilities::{Facilities, FacilityTable, NoDeferredOutput, NoTaskPolicy, OutputQueue, TaskPolicy};
use crate::interpreter::Interpreter;
use crate::io::RunIo;
use crate::keyin::KeyinHandler;
use crate::registry::RunRegistry;
use crate::run::{PinnedRun, RunInfo, RunKind, RunSpec};
use crate::scheduler::{ControlModeScheduler, SchedulerSettings};
use crate::signal::wait_for_shutdown_signal;
use crate::stopper::Stopper;

/// External subsystems the executive drives.
#[derive(Clone)]
pub struct Collaborators {
    pub interpreter: Arc<dyn Interpreter>,
    pub facilities: Arc<dyn Facilities>,
    pub output: Arc<dyn OutputQueue>,
    pub policy: Arc<dyn TaskPolicy>,
    pub pacer: Arc<dyn Pacer>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            interpreter: Arc::new(BasicInterpreter::new()),
            facilities: Arc::new(FacilityTable::new()),
            output: Arc::new(NoDeferredOutput),
            policy: Arc::new(NoTaskPolicy),
            pacer: Arc::new(TokioPacer),
        }
    }
}

struct Tasks {
    router: JoinHandle<()>,
    scheduler: JoinHandle<()>,
    keyin: JoinHandle<()>,
}

pub struct Executive {
    config: ExecConfig,
    bus: EventBus,
    router: Arc<ConsoleRouter>,
    registry: Arc<RunRegistry>,
    scheduler: Arc<ControlModeScheduler>,
    stopper: Stopper,
    exec_run: Mutex<Option<PinnedRun>>,
    exec_name: String,
    scheduler_token: CancellationToken,
    router_token: CancellationToken,
    tasks: Tasks,
}

impl Executive {
    /// Boot every subsystem. Must be called from within a tokio runtime.
    ///
    /// Any subsystem failing to come up is reported as
    /// [`StopCode::ManagerStartFailure`].
    pub fn boot(
        config: ExecConfig,
        main_console: Arc<dyn ConsoleInterface>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let bus = EventBus::default();

        // Router
        let router = Arc::new(ConsoleRouter::new(bus.clone()));
        router
            .register_console(main_console, true)
            .map_err(|e| start_failure("console router", e))?;
        let router_token = CancellationToken::new();
        let router_task = tokio::spawn(Arc::clone(&router).run(
            Arc::clone(&collaborators.pacer),
            config.console.poll_interval(),
            router_token.clone(),
        ));
        let stopper = Stopper::new(Arc::clone(&router), bus.clone());

        // Registry and the executive's own run
        let registry = Arc::new(
            RunRegistry::new(
                Arc::clone(&router),
                bus.clone(),
                collaborators.facilities,
                collaborators.output,
            )
            .with_notice_timestamps(config.executive.notice_timestamps)
            .with_name_limit(config.executive.duplicate_name_limit),
        );
        let exec = &config.executive;
        let exec_run = match registry.create_run(RunSpec::new(
            RunKind::Exec,
            &exec.run_id,
            &exec.account,
            &exec.project,
            &exec.user,
        )) {
            Ok(run) => run,
            Err(e) => {
                router_token.cancel();
                return Err(start_failure("run registry", e));
            }
        };
        let exec_name = exec_run.name().to_string();

        // Scheduler
        let settings = SchedulerSettings {
            idle_sleep: config.scheduler.idle_sleep(),
            page_length: config.scheduler.page_length,
            sweep_every_passes: config.scheduler.sweep_every_passes,
        };
        let scheduler = Arc::new(
            ControlModeScheduler::new(
                Arc::clone(&registry),
                collaborators.interpreter,
                collaborators.policy,
                collaborators.pacer,
                settings,
            )
            .with_stopper(stopper.clone()),
        );
        let scheduler_token = CancellationToken::new();
        let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run(scheduler_token.clone()));

        // Keyins
        let (keyin_tx, keyin_rx) = mpsc::channel(64);
        router.set_keyin_sender(keyin_tx);
        let keyin_task = tokio::spawn(
            KeyinHandler::new(Arc::clone(&registry), stopper.clone())
                .serve(keyin_rx, scheduler_token.clone()),
        );

        router.set_running(true);
        info!(exec = %exec_name, "executive running");

        Ok(Self {
            config,
            bus,
            router,
            registry,
            scheduler,
            stopper,
            exec_run: Mutex::new(Some(exec_run)),
            exec_name,
            scheduler_token,
            router_token,
            tasks: Tasks {
                router: router_task,
                scheduler: scheduler_task,
                keyin: keyin_task,
            },
        })
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn router(&self) -> &Arc<ConsoleRouter> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<ControlModeScheduler> {
        &self.scheduler
    }

    pub fn stopper(&self) -> &Stopper {
        &self.stopper
    }

    /// Name of the executive's own run.
    pub fn exec_run_name(&self) -> &str {
        &self.exec_name
    }

    pub fn runs(&self) -> Vec<RunInfo> {
        self.registry.runs()
    }

    // ── Runs ───────────────────────────────────────────────────

    /// Create and admit a run, returning its unique name. Exhausting the
    /// run-name space stops the executive.
    pub fn create_run(&self, spec: RunSpec) -> Result<String> {
        let run = self.registry.create_run(spec).inspect_err(|e| self.escalate(e))?;
        self.registry.activate(&run);
        Ok(run.name().to_string())
    }

    pub fn create_demand_run(
        &self,
        run_id: &str,
        account: &str,
        project: &str,
        user: &str,
        session: Option<RoutingId>,
        io: Arc<dyn RunIo>,
    ) -> Result<String> {
        self.create_run(
            RunSpec::new(RunKind::Demand { session }, run_id, account, project, user).with_io(io),
        )
    }

    pub fn create_batch_run(
        &self,
        run_id: &str,
        account: &str,
        project: &str,
        user: &str,
        io: Arc<dyn RunIo>,
    ) -> Result<String> {
        self.create_run(RunSpec::new(RunKind::Batch, run_id, account, project, user).with_io(io))
    }

    pub fn abort_run(&self, name: &str, reason: &str) -> Result<()> {
        let run = self
            .registry
            .pin(name)
            .ok_or_else(|| ExecError::RunNotFound(name.to_string()))?;
        self.registry.abort_run(&run, reason);
        Ok(())
    }

    pub fn end_session(&self, name: &str) -> Result<()> {
        let run = self
            .registry
            .pin(name)
            .ok_or_else(|| ExecError::RunNotFound(name.to_string()))?;
        if !self.registry.end_session(&run) {
            return Err(ExecError::invalid("run", format!("{name} has no session to end")));
        }
        Ok(())
    }

    // ── Consoles ───────────────────────────────────────────────

    pub fn register_console(&self, console: Arc<dyn ConsoleInterface>) -> Result<RoutingId> {
        self.router.register_console(console, false)
    }

    /// Unregister a console. Removing the main console while running stops
    /// the executive. Demand runs bound to the console lose their session.
    pub fn unregister_console(&self, console: &Arc<dyn ConsoleInterface>) -> Result<()> {
        let routing = self.router.routing_of(console.name());
        self.router
            .unregister_console(console)
            .inspect_err(|e| self.escalate(e))?;
        if let Some(routing) = routing {
            let ended = self.registry.end_sessions_on(routing);
            if ended > 0 {
                info!(console = %console.name(), ended, "sessions ended with their console");
            }
        }
        Ok(())
    }

    // ── Stop ───────────────────────────────────────────────────

    pub fn stop(&self, code: StopCode) -> bool {
        self.stopper.stop(code)
    }

    pub fn stop_code(&self) -> Option<StopCode> {
        self.stopper.code()
    }

    fn escalate(&self, error: &ExecError) {
        if let Some(code) = error.stop_code() {
            self.stopper.stop(code);
        }
    }

    /// Wait for a stop request or a termination signal, whichever comes
    /// first. A signal counts as an operator shutdown.
    pub async fn run_until_stopped(&self) -> StopCode {
        tokio::select! {
            code = self.stopper.stopped() => code.unwrap_or(StopCode::OperatorShutdown),
            signal = wait_for_shutdown_signal() => {
                match signal {
                    Ok(()) => {
                        info!("termination signal received");
                        self.stopper.stop(StopCode::OperatorShutdown);
                    }
                    Err(e) => warn!(error = %e, "cannot listen for signals"),
                }
                self.stopper.stopped().await.unwrap_or(StopCode::OperatorShutdown)
            }
        }
    }

    /// Tear everything down in reverse boot order and return the stop code
    /// that ended the session.
    pub async fn shutdown(self) -> StopCode {
        self.stopper.stop(StopCode::OperatorShutdown);
        let code = self.stopper.code().unwrap_or(StopCode::OperatorShutdown);
        info!(%code, "executive shutting down");

        // Scheduler and keyins
        self.scheduler_token.cancel();
        join("scheduler", self.tasks.scheduler).await;
        join("keyin", self.tasks.keyin).await;

        // Statements still executing get the grace period
        let grace = self.config.executive.shutdown_grace();
        if !drain_executing(&self.registry, grace).await {
            warn!(
                grace_ms = grace.as_millis() as u64,
                executing = self.registry.executing_count(),
                "statements still executing after grace period"
            );
        }

        // Runs
        for name in self.registry.names() {
            if let Some(run) = self.registry.pin(&name) {
                self.registry.finish_run(&run);
                self.registry.end_session(&run);
            }
        }
        self.exec_run.lock().take();
        reclaim_runs(&self.registry);

        // Router: cancelling it releases statements blocked on a read-reply,
        // whose runs are then closed out.
        self.router_token.cancel();
        join("console router", self.tasks.router).await;
        self.router.shutdown();
        if self.registry.executing_count() > 0 {
            if !drain_executing(&self.registry, grace).await {
                warn!(
                    executing = self.registry.executing_count(),
                    "statements never finished; their runs stay open"
                );
            }
            reclaim_runs(&self.registry);
        }

        // Consoles: flush what is queued, then detach
        while self.router.poll().did_work() {}
        for (id, name) in self.router.console_names() {
            if let Err(e) = self.router.unregister_routing(id) {
                warn!(console = %name, error = %e, "console unregistration failed");
            }
        }

        self.bus.publish(ExecEvent::Shutdown);
        info!(%code, remaining_runs = self.registry.len(), "executive stopped");
        code
    }
}

/// Wait up to `grace` for executing statements to finish.
async fn drain_executing(registry: &Arc<RunRegistry>, grace: Duration) -> bool {
    let registry = Arc::clone(registry);
    tokio::time::timeout(grace, async move {
        while registry.executing_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Sweep until a pass does no work, at most three passes.
fn reclaim_runs(registry: &RunRegistry) {
    for _ in 0..3 {
        match registry.sweep() {
            Ok(report) if !report.did_work() => break,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "sweep failed during shutdown");
                break;
            }
        }
    }
}

fn start_failure(subsystem: &str, e: ExecError) -> ExecError {
    error!(subsystem, error = %e, "manager start failure");
    ExecError::Stopped(StopCode::ManagerStartFailure)
}

async fn join(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(task = name, error = %e, "task ended abnormally");
    }
}
