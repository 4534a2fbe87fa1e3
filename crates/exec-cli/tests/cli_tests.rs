#[cfg(test)]
mod tests {
    use clap::Parser;
    use exec_cli::Cli;
    use exec_cli::commands::script_run_id;
    use std::path::Path;

    // ── Argument parsing ───────────────────────────────────────

    #[test]
    fn test_parse_start_with_scripts() {
        let cli = Cli::try_parse_from([
            "execd", "--verbose", "start", "--script", "a.run", "-s", "b.run",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["execd", "-v", "-q", "version"]).is_err());
    }

    #[test]
    fn test_check_id_needs_two_arguments() {
        assert!(Cli::try_parse_from(["execd", "check-id", "run"]).is_err());
        assert!(Cli::try_parse_from(["execd", "check-id", "run", "JOB1"]).is_ok());
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        assert!(Cli::try_parse_from(["execd", "config", "--json", "--config", "x.toml"]).is_ok());
    }

    // ── Script run-ids ─────────────────────────────────────────

    #[test]
    fn test_script_run_id_from_file_stem() {
        assert_eq!(script_run_id(Path::new("/tmp/nightly.run")), "NIGHTL");
        assert_eq!(script_run_id(Path::new("job_1.txt")), "JOB1");
    }

    #[test]
    fn test_script_run_id_fallback() {
        assert_eq!(script_run_id(Path::new("___.run")), "BATCH");
        assert_eq!(script_run_id(Path::new("")), "BATCH");
    }
}
