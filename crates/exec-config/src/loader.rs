use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use exec_core::{ExecError, Result};

use crate::schema::ExecConfig;

/// Loads the executive configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<ExecConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > EXECD_CONFIG env > ~/.execd/execd.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("EXECD_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".execd")
            .join("execd.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ExecConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(ExecError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    fn parse(raw: &str, path: &Path) -> Result<ExecConfig> {
        toml::from_str::<ExecConfig>(raw).map_err(|e| {
            ExecError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> ExecConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<ExecConfig>> {
        Arc::clone(&self.config)
    }

    /// Path the config was (or would have been) read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (EXECD_LOG_LEVEL, EXECD_RUN_ID, etc.)
    fn apply_env_overrides(mut config: ExecConfig) -> ExecConfig {
        if let Ok(v) = std::env::var("EXECD_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("EXECD_RUN_ID") {
            config.executive.run_id = v;
        }
        if let Ok(v) = std::env::var("EXECD_IDLE_SLEEP_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.scheduler.idle_sleep_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("EXECD_POLL_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.console.poll_interval_ms = ms;
            }
        }
        config
    }

    /// Reload the config from disk. Values read at boot (cadence, names)
    /// take effect on the next boot.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(ExecError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = Self::apply_env_overrides(Self::parse(&raw, &self.config_path)?);
        new_config.validate().map_err(ExecError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}
