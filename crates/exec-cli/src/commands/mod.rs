use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::{Path, PathBuf};

use exec_config::{ConfigLoader, ExecConfig};
use exec_core::{ExecError, IdentKind, Result, fieldata};

mod start;

/// Executive core of an emulated mainframe operating system
#[derive(Parser)]
#[command(name = "execd", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to execd.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the executive with the terminal as operator console
    Start {
        /// Control-statement file to submit as a batch run (repeatable)
        #[arg(short, long)]
        script: Vec<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a value against an identifier grammar
    CheckId {
        /// Identifier kind: run, account, project, user, qualifier, file, key
        kind: String,
        /// Value to check
        value: String,
    },
    /// Show version and build info
    Version,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };
        init_tracing(&config, &log_level);

        match self.command {
            Commands::Start { script } => start::cmd_start(config, script).await,
            Commands::Config { json } => Self::cmd_config(&config, config_loader.path(), json),
            Commands::CheckId { kind, value } => Self::cmd_check_id(&kind, &value),
            Commands::Version => Self::cmd_version(),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    fn cmd_config(config: &ExecConfig, path: &Path, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!("# {}", path.display());
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| ExecError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_check_id(kind: &str, value: &str) -> Result<()> {
        let kind: IdentKind = kind.parse()?;
        kind.validate(value)?;
        println!("{value} is a valid {kind}");
        if kind == IdentKind::RunId && value.len() <= 6 {
            println!("   Fieldata word: {:012o}", fieldata::pack_word(value));
        }
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("execd v{}", env!("CARGO_PKG_VERSION"));
        println!("   Rust edition: 2024");
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "execd", &mut std::io::stdout());
        Ok(())
    }
}

fn init_tracing(config: &ExecConfig, log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    // Logs go to stderr; stdout belongs to the operator console.
    match config.logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init(),
    }
}

/// Derive a batch run-id from a script file name: its alphanumeric
/// characters, upper-cased, at most six of them.
pub fn script_run_id(path: &Path) -> String {
    let id: String = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(6)
        .collect::<String>()
        .to_ascii_uppercase();
    if id.is_empty() { "BATCH".to_string() } else { id }
}
