use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use exec_config::ExecConfig;
use exec_console::StdioConsole;
use exec_core::{ExecError, Result};
use exec_runtime::{Collaborators, Executive, QueueIo};

use super::script_run_id;

pub(super) async fn cmd_start(config: ExecConfig, scripts: Vec<PathBuf>) -> Result<()> {
    println!("execd v{}", env!("CARGO_PKG_VERSION"));
    println!("   Exec run: {}", config.executive.run_id);
    println!("   Console: {}", config.console.main_console);
    println!("   Keyins: SS, AB <run>, $!");
    println!();

    let console = Arc::new(StdioConsole::spawn(
        config.console.main_console.clone(),
        config.console.read_reply_limit,
    ));
    let identity = config.executive.clone();
    let exec = Executive::boot(config, console, Collaborators::default())?;

    // Submit scripts as batch runs; their printer output is shown at shutdown
    let mut transcripts = Vec::new();
    for path in &scripts {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                error!(script = %path.display(), error = %e, "cannot read script");
                continue;
            }
        };
        let io = Arc::new(QueueIo::batch(text.lines()));
        match exec.create_batch_run(
            &script_run_id(path),
            &identity.account,
            &identity.project,
            &identity.user,
            io.clone(),
        ) {
            Ok(name) => {
                info!(run = %name, script = %path.display(), "batch run submitted");
                transcripts.push((name, io));
            }
            Err(e) => error!(script = %path.display(), error = %e, "batch run rejected"),
        }
    }

    exec.run_until_stopped().await;
    let code = exec.shutdown().await;

    for (name, io) in transcripts {
        println!();
        println!("── {name} ──");
        for line in io.output() {
            println!("{line}");
        }
    }
    println!();
    println!("EXEC STOPPED: {code}");

    if code.is_fault() {
        return Err(ExecError::Stopped(code));
    }
    Ok(())
}
