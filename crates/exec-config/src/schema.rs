use serde::{Deserialize, Serialize};
use std::time::Duration;

use exec_core::ident;

/// Root configuration, maps to `execd.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub executive: ExecutiveConfig,
    pub scheduler: SchedulerConfig,
    pub console: ConsoleConfig,
    pub logging: LoggingConfig,
}

// ── Executive ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutiveConfig {
    /// Run-id of the executive's own pseudo-run.
    pub run_id: String,
    pub account: String,
    pub project: String,
    pub user: String,
    /// Append an HH:MM:SS timestamp to START/FIN notices.
    pub notice_timestamps: bool,
    /// How long shutdown waits for executing statements before giving up.
    pub shutdown_grace_ms: u64,
    /// Renamed candidates tried for a duplicate run-id before the name space
    /// counts as exhausted. Unset tries the whole space.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_name_limit: Option<usize>,
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            run_id: "EXEC8".into(),
            account: "SYSTEM".into(),
            project: "SYS$".into(),
            user: "EXEC".into(),
            notice_timestamps: false,
            shutdown_grace_ms: 5_000,
            duplicate_name_limit: None,
        }
    }
}

impl ExecutiveConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep after a pass in which no run made progress.
    pub idle_sleep_ms: u64,
    /// Printed lines per page before the echo policy ejects.
    pub page_length: u32,
    /// Run the reclamation sweep every N scheduler passes.
    pub sweep_every_passes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: 100,
            page_length: 60,
            sweep_every_passes: 1,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

// ── Console ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Sleep after a router poll that found nothing to do.
    pub poll_interval_ms: u64,
    /// Outstanding read-reply messages allowed per console.
    pub read_reply_limit: usize,
    /// Name of the operator console registered at boot.
    pub main_console: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            read_reply_limit: 4,
            main_console: "SYSCON".into(),
        }
    }
}

impl ConsoleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{}: {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl ExecConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Executive identity ───
        let identity = [
            ("executive.run_id", ident::validate_run_id(&self.executive.run_id)),
            ("executive.account", ident::validate_account_id(&self.executive.account)),
            ("executive.project", ident::validate_project_id(&self.executive.project)),
            ("executive.user", ident::validate_user_id(&self.executive.user)),
        ];
        for (field, check) in identity {
            if let Err(e) = check {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: e.to_string(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        if self.executive.duplicate_name_limit == Some(0) {
            warnings.push(ConfigWarning {
                field: "executive.duplicate_name_limit".into(),
                message: "limit is 0: every duplicate run-id exhausts the name space".into(),
                severity: WarningSeverity::Error,
                hint: Some("leave it unset to search the whole name space".into()),
            });
        }

        // ── Polling cadence ───
        if self.scheduler.idle_sleep_ms == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.idle_sleep_ms".into(),
                message: "idle sleep is 0: the scheduler will spin".into(),
                severity: WarningSeverity::Warning,
                hint: Some("100 ms keeps interactive latency low without burning a core".into()),
            });
        }
        if self.console.poll_interval_ms == 0 {
            warnings.push(ConfigWarning {
                field: "console.poll_interval_ms".into(),
                message: "poll interval is 0: the console router will spin".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 100".into()),
            });
        }
        if self.scheduler.sweep_every_passes == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.sweep_every_passes".into(),
                message: "sweep interval is 0: finished runs would never be reclaimed".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to 1 to sweep after every pass".into()),
            });
        }
        if self.scheduler.page_length == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.page_length".into(),
                message: "page length is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 60".into()),
            });
        }

        // ── Console ───
        if self.console.read_reply_limit == 0 {
            warnings.push(ConfigWarning {
                field: "console.read_reply_limit".into(),
                message: "read-reply limit is 0: no console could accept a read-reply".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 4".into()),
            });
        }
        if self.console.main_console.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "console.main_console".into(),
                message: "main console name is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'SYSCON'".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
