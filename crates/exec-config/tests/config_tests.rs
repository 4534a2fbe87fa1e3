#[cfg(test)]
mod tests {
    use exec_config::ConfigLoader;
    use exec_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_exec_config_defaults() {
        let config = ExecConfig::default();
        assert_eq!(config.executive.run_id, "EXEC8");
        assert!(!config.executive.notice_timestamps);
        assert_eq!(config.scheduler.idle_sleep_ms, 100);
        assert_eq!(config.console.poll_interval_ms, 100);
        assert_eq!(config.console.main_console, "SYSCON");
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.page_length, 60);
        assert_eq!(config.sweep_every_passes, 1);
        assert_eq!(config.idle_sleep(), std::time::Duration::from_millis(100));
    }

    #[test]
    fn test_console_config_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.read_reply_limit, 4);
        assert_eq!(config.poll_interval(), std::time::Duration::from_millis(100));
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = ExecConfig::default().validate().unwrap();
        assert!(warnings.is_empty());
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = ExecConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: ExecConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.executive.run_id, config.executive.run_id);
        assert_eq!(restored.console.main_console, config.console.main_console);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[scheduler]
idle_sleep_ms = 250

[console]
main_console = "OPCON"
"#;
        let config: ExecConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.idle_sleep_ms, 250);
        assert_eq!(config.console.main_console, "OPCON");
        // Defaults should fill in
        assert_eq!(config.scheduler.page_length, 60);
        assert_eq!(config.console.read_reply_limit, 4);
        assert_eq!(config.executive.run_id, "EXEC8");
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_invalid_exec_run_id_is_error() {
        let mut config = ExecConfig::default();
        config.executive.run_id = "EXEC-8".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("executive.run_id"));
    }

    #[test]
    fn test_zero_read_reply_limit_is_error() {
        let mut config = ExecConfig::default();
        config.console.read_reply_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_duplicate_name_limit_is_error() {
        let mut config = ExecConfig::default();
        config.executive.duplicate_name_limit = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.contains("executive.duplicate_name_limit"));
        config.executive.duplicate_name_limit = Some(4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_idle_sleep_is_warning() {
        let mut config = ExecConfig::default();
        config.scheduler.idle_sleep_ms = 0;
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);
        assert_eq!(warnings[0].field, "scheduler.idle_sleep_ms");
    }

    #[test]
    fn test_unknown_log_format_is_warning() {
        let mut config = ExecConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "logging.format"));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("execd.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[executive]
run_id = "EXECX"
notice_timestamps = true

[console]
read_reply_limit = 2
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.executive.run_id, "EXECX");
        assert!(config.executive.notice_timestamps);
        assert_eq!(config.console.read_reply_limit, 2);
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().console.main_console, "SYSCON");
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("execd.toml");
        std::fs::write(&config_path, "[console]\nread_reply_limit = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("execd.toml");
        std::fs::write(&config_path, "[console\n").unwrap();
        let err = ConfigLoader::load(Some(config_path.as_path())).err().unwrap();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("execd.toml");
        std::fs::write(&config_path, "[scheduler]\npage_length = 40\n").unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().scheduler.page_length, 40);

        std::fs::write(&config_path, "[scheduler]\npage_length = 66\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().scheduler.page_length, 66);
        assert_eq!(loader.shared().read().scheduler.page_length, 66);
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = ExecConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: ExecConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.executive.project, config.executive.project);
    }
}
