use std::sync::Arc;
use tracing::debug;

use crate::interpreter::{Interpreter, ParsedStatement, StatementContext, StatementStatus};

/// Executes one parsed statement against one run, then finishes.
///
/// Holds its own pin on the run for as long as it exists. The scheduler
/// never joins it; it checks [`JoinHandle::is_finished`](tokio::task::JoinHandle::is_finished)
/// on a later pass.
pub struct StatementExecutor {
    statement: ParsedStatement,
    interpreter: Arc<dyn Interpreter>,
    ctx: StatementContext,
}

impl StatementExecutor {
    pub fn new(
        statement: ParsedStatement,
        interpreter: Arc<dyn Interpreter>,
        ctx: StatementContext,
    ) -> Self {
        Self {
            statement,
            interpreter,
            ctx,
        }
    }

    pub async fn run(self) {
        let run = &self.ctx.run;
        debug!(run = %run.name(), statement = %self.statement.mnemonic, "executing statement");

        let outcome = self.interpreter.execute(&self.statement, &self.ctx).await;
        match outcome.status {
            StatementStatus::Ok => {}
            StatementStatus::Error => run.set_error_mode(),
            StatementStatus::Abort => {
                run.set_error_mode();
                let reason = outcome
                    .output
                    .first()
                    .cloned()
                    .unwrap_or_else(|| self.statement.mnemonic.clone());
                self.ctx.registry.abort_run(run, &reason);
            }
        }
        for line in &outcome.output {
            run.print(line);
        }
        run.clear_images();

        debug!(run = %run.name(), status = ?outcome.status, "statement complete");
    }
}
