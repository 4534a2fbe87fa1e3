#[cfg(test)]
mod tests {
    use exec_console::{BufferConsole, ConsoleLogKind, ConsoleRouter};
    use exec_core::{EventBus, ExecError, ExecEvent};
    use exec_runtime::naming::{first_candidate, next_candidate, unique_name};
    use exec_runtime::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        router: Arc<ConsoleRouter>,
        console: Arc<BufferConsole>,
        facilities: Arc<FacilityTable>,
        registry: Arc<RunRegistry>,
        bus: EventBus,
    }

    fn fixture_with_output(output: Arc<dyn OutputQueue>) -> Fixture {
        let bus = EventBus::default();
        let router = Arc::new(ConsoleRouter::new(bus.clone()));
        let console = Arc::new(BufferConsole::new_system("SYSCON"));
        router.register_console(console.clone(), true).unwrap();
        let facilities = Arc::new(FacilityTable::new());
        let registry = Arc::new(RunRegistry::new(
            router.clone(),
            bus.clone(),
            facilities.clone(),
            output,
        ));
        Fixture {
            router,
            console,
            facilities,
            registry,
            bus,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_output(Arc::new(NoDeferredOutput))
    }

    impl Fixture {
        fn flush(&self) -> Vec<String> {
            while self.router.poll().did_work() {}
            self.console.displayed()
        }

        fn demand(&self, run_id: &str) -> PinnedRun {
            self.registry
                .create_run(RunSpec::new(
                    RunKind::Demand { session: None },
                    run_id,
                    "ACCT1",
                    "PROJ",
                    "USER1",
                ))
                .unwrap()
        }

        fn batch(&self, run_id: &str, io: Arc<QueueIo>) -> PinnedRun {
            self.registry
                .create_run(
                    RunSpec::new(RunKind::Batch, run_id, "ACCT1", "PROJ", "USER1").with_io(io),
                )
                .unwrap()
        }
    }

    // ── Naming sequence tests ──────────────────────────────────

    #[test]
    fn test_short_names_grow_on_first_collision() {
        assert_eq!(first_candidate("ABC"), "ABCA");
        assert_eq!(first_candidate("RUN000"), "RUN001");
    }

    #[test]
    fn test_rightmost_increment() {
        assert_eq!(next_candidate("ABCA"), "ABCB");
        assert_eq!(next_candidate("ABCZ"), "ABC0");
        assert_eq!(next_candidate("ABC0"), "ABC1");
        assert_eq!(next_candidate("ABCZZZ"), "ABCZZ0");
    }

    #[test]
    fn test_nine_grows_short_names_and_carries_full_ones() {
        assert_eq!(next_candidate("ABC9"), "ABC9A");
        assert_eq!(next_candidate("RUN009"), "RUN01A");
        assert_eq!(next_candidate("ABC999"), "ABDAAA");
        assert_eq!(next_candidate("999999"), "AAAAAA");
    }

    #[test]
    fn test_unique_name_walks_the_sequence() {
        let mut taken: BTreeSet<String> = ["ABC".to_string()].into();
        for c in ('A'..='Z').chain('0'..='4') {
            taken.insert(format!("ABC{c}"));
        }
        let name = unique_name("ABC", taken.len() + 1, |n| taken.contains(n)).unwrap();
        assert_eq!(name, "ABC5");
    }

    #[test]
    fn test_unique_name_free_base_is_kept() {
        assert_eq!(unique_name("RUN1", 1, |_| false).unwrap(), "RUN1");
    }

    #[test]
    fn test_unique_name_exhaustion() {
        let err = unique_name("ABC", 8, |_| true).unwrap_err();
        assert!(matches!(err, ExecError::NameSpaceExhausted(_)));
        assert_eq!(
            err.stop_code(),
            Some(exec_core::StopCode::RunNameExhausted)
        );
    }

    // ── Creation tests ─────────────────────────────────────────

    #[test]
    fn test_create_run_posts_start_notice() {
        let f = fixture();
        let run = f
            .registry
            .create_run(RunSpec::new(RunKind::Batch, "RUN000", "ACCT1", "PROJ", "USER1"))
            .unwrap();
        assert_eq!(run.name(), "RUN000");
        assert_eq!(f.registry.names(), vec!["RUN000".to_string()]);
        assert_eq!(run.state(), RunState::InBacklog);
        assert!(f.flush().contains(&"RUN000 START".to_string()));
    }

    #[test]
    fn test_duplicate_run_id_is_renamed() {
        let f = fixture();
        let first = f.demand("ABC");
        let second = f.demand("ABC");
        assert_eq!(first.name(), "ABC");
        assert_eq!(second.name(), "ABCA");
        assert_eq!(second.original_name(), "ABC");

        let shown = f.flush();
        assert!(shown.contains(&"ABC DUPLICATED NEW ID IS ABCA".to_string()));
        assert!(shown.contains(&"ABCA START".to_string()));
    }

    #[test]
    fn test_many_collisions_stay_unique() {
        let f = fixture();
        let runs: Vec<PinnedRun> = (0..38).map(|_| f.demand("ABC")).collect();
        let names: BTreeSet<String> = runs.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names.len(), 38);
        assert_eq!(runs[26].name(), "ABCZ");
        assert_eq!(runs[27].name(), "ABC0");
        assert_eq!(runs[37].name(), "ABC9A");
    }

    #[test]
    fn test_run_id_is_upper_cased() {
        let f = fixture();
        let run = f.demand("abc");
        assert_eq!(run.name(), "ABC");
        assert!(f.registry.contains("abc"));
        assert!(f.registry.pin("Abc").is_some());
    }

    #[test]
    fn test_invalid_fields_rejected() {
        let f = fixture();
        let bad = [
            RunSpec::new(RunKind::Batch, "RUN-1", "ACCT", "PROJ", "USER"),
            RunSpec::new(RunKind::Batch, "RUN1", "ACCT$", "PROJ", "USER"),
            RunSpec::new(RunKind::Batch, "RUN1", "ACCT", "PRO.J", "USER"),
            RunSpec::new(RunKind::Batch, "RUN1", "ACCT", "PROJ", ""),
        ];
        for spec in bad {
            let err = f.registry.create_run(spec).unwrap_err();
            assert!(matches!(err, ExecError::InvalidField { .. }), "{err}");
        }
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_create_publishes_event() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let _run = f.demand("EVT");
        match rx.try_recv().unwrap() {
            ExecEvent::RunCreated { name, run_kind, .. } => {
                assert_eq!(name, "EVT");
                assert_eq!(run_kind, "demand");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_start_notice_lands_in_run_console_log() {
        let f = fixture();
        let run = f.demand("LOGGED");
        f.flush();
        let log = run.console_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, ConsoleLogKind::ReadOnly);
        assert_eq!(log[0].text, "LOGGED START");
    }

    #[test]
    fn test_notice_timestamps() {
        let bus = EventBus::default();
        let router = Arc::new(ConsoleRouter::new(bus.clone()));
        let console = Arc::new(BufferConsole::new_system("SYSCON"));
        router.register_console(console.clone(), true).unwrap();
        let registry = RunRegistry::new(
            router.clone(),
            bus,
            Arc::new(FacilityTable::new()),
            Arc::new(NoDeferredOutput),
        )
        .with_notice_timestamps(true);
        let _run = registry
            .create_run(RunSpec::new(RunKind::Tip, "TIP1", "A", "P", "U"))
            .unwrap();
        while router.poll().did_work() {}
        let shown = console.displayed();
        let start = shown.iter().find(|l| l.starts_with("TIP1 START ")).unwrap();
        // "TIP1 START HH:MM:SS"
        assert_eq!(start.len(), "TIP1 START ".len() + 8);
    }

    // ── Pin and sweep tests ────────────────────────────────────

    #[test]
    fn test_pins_count_up_and_down() {
        let f = fixture();
        let run = f.demand("PIN");
        assert_eq!(run.pin_count(), 1);
        let other = f.registry.pin("PIN").unwrap();
        let cloned = other.clone();
        assert_eq!(run.pin_count(), 3);
        drop(other);
        drop(cloned);
        assert_eq!(run.pin_count(), 1);
        // An unpinned lookup does not count.
        let cell = f.registry.lookup("PIN").unwrap();
        assert_eq!(cell.pin_count(), 1);
    }

    #[test]
    fn test_demand_run_lifecycle_through_rsi() {
        let f = fixture();
        let run = f.demand("TTY");
        assert!(f.registry.finish_run(&run));
        assert_eq!(run.state(), RunState::Fin);

        let report = f.registry.sweep().unwrap();
        assert_eq!(report.closed, 1);
        assert_eq!(run.state(), RunState::RsiTerm);

        // Nothing happens until the session ends.
        f.registry.sweep().unwrap();
        assert_eq!(run.state(), RunState::RsiTerm);

        assert!(f.registry.end_session(&run));
        assert_eq!(run.state(), RunState::RsiDetached);
        f.registry.sweep().unwrap();
        assert_eq!(run.state(), RunState::Smoque);

        // Still pinned: never destroyed.
        let report = f.registry.sweep().unwrap();
        assert_eq!(report.destroyed, 0);
        assert!(f.registry.contains("TTY"));

        drop(run);
        let report = f.registry.sweep().unwrap();
        assert_eq!(report.destroyed, 1);
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_pinned_run_survives_repeated_sweeps() {
        let f = fixture();
        let run = f.demand("HELD");
        f.registry.end_session(&run);
        let extra = f.registry.pin("HELD").unwrap();
        drop(run);
        for _ in 0..5 {
            f.registry.sweep().unwrap();
        }
        assert_eq!(extra.state(), RunState::Smoque);
        assert!(f.registry.contains("HELD"));
        drop(extra);
        f.registry.sweep().unwrap();
        assert!(!f.registry.contains("HELD"));
    }

    #[test]
    fn test_end_session_on_active_demand_run_detaches() {
        let f = fixture();
        let run = f.demand("GONE");
        assert!(f.registry.end_session(&run));
        assert!(run.is_detached());
        assert_eq!(run.state(), RunState::Fin);
        f.registry.sweep().unwrap();
        assert_eq!(run.state(), RunState::Smoque);
    }

    #[test]
    fn test_end_sessions_on_routing_only_touches_bound_runs() {
        let f = fixture();
        let tty = Arc::new(BufferConsole::new_session("TTY1"));
        let id = f.router.register_console(tty, false).unwrap();
        let spec = |run_id: &str| {
            RunSpec::new(RunKind::Demand { session: Some(id) }, run_id, "ACCT1", "PROJ", "USER1")
        };
        let bound = f.registry.create_run(spec("BOUND")).unwrap();
        let done = f.registry.create_run(spec("DONE")).unwrap();
        let other = f.demand("OTHER");
        f.registry.finish_run(&done);
        f.registry.sweep().unwrap();
        assert_eq!(done.state(), RunState::RsiTerm);

        assert_eq!(f.registry.end_sessions_on(id), 2);
        assert_eq!(bound.state(), RunState::Fin);
        assert!(bound.is_detached());
        assert_eq!(done.state(), RunState::RsiDetached);
        assert_eq!(other.state(), RunState::Active);
        assert!(!other.is_detached());
    }

    #[test]
    fn test_demand_notices_follow_the_session_console() {
        let f = fixture();
        let tty = Arc::new(BufferConsole::new_session("TTY1"));
        let id = f.router.register_console(tty.clone(), false).unwrap();
        let run = f
            .registry
            .create_run(RunSpec::new(
                RunKind::Demand { session: Some(id) },
                "TTY",
                "ACCT1",
                "PROJ",
                "USER1",
            ))
            .unwrap();
        let shown = f.flush();
        assert!(tty.displayed().contains(&"TTY START".to_string()));
        assert!(!shown.contains(&"TTY START".to_string()));

        // Once the session console is gone the system group gets them.
        f.router.unregister_routing(id).unwrap();
        f.registry.finish_run(&run);
        f.registry.sweep().unwrap();
        assert!(f.flush().contains(&"TTY FIN".to_string()));
        assert!(!tty.displayed().contains(&"TTY FIN".to_string()));
    }

    #[test]
    fn test_end_session_rejected_for_batch() {
        let f = fixture();
        let run = f.batch("JOB", Arc::new(QueueIo::new()));
        assert!(!f.registry.end_session(&run));
    }

    #[test]
    fn test_batch_close_prints_tailsheet() {
        let f = fixture();
        let io = Arc::new(QueueIo::new());
        let run = f.batch("JOB", io.clone());
        assert!(f.registry.activate(&run));
        assert!(!f.registry.activate(&run));
        f.registry.finish_run(&run);
        f.registry.sweep().unwrap();
        assert_eq!(run.state(), RunState::Smoque);

        let out = io.output();
        assert!(out.iter().any(|l| l.starts_with("RUN JOB")));
        assert!(out.contains(&"IMAGES READ 0".to_string()));
        assert!(out.contains(&"RESOURCE WAIT 00:00:00.000".to_string()));
        assert_eq!(io.ejects(), 1);
        assert!(f.flush().contains(&"JOB FIN".to_string()));
    }

    #[test]
    fn test_abort_suffixes_fin_notice() {
        let f = fixture();
        let run = f.demand("BAD");
        f.registry.abort_run(&run, "BY OPERATOR");
        assert_eq!(run.status(), RunStatus::Abort);
        assert_eq!(run.state(), RunState::Fin);
        f.registry.sweep().unwrap();

        let shown = f.flush();
        assert!(shown.contains(&"BAD ABORTED BY OPERATOR".to_string()));
        assert!(shown.contains(&"BAD FIN ABORT".to_string()));
    }

    #[test]
    fn test_error_status_suffix() {
        let f = fixture();
        let run = f.demand("ERR");
        run.set_error_mode();
        f.registry.finish_run(&run);
        f.registry.close_run(&run);
        assert!(f.flush().contains(&"ERR FIN ERROR".to_string()));
    }

    #[test]
    fn test_close_releases_every_item_once() {
        let f = fixture();
        let run = f.demand("FAC");
        for name in ["PROJ*A", "PROJ*B", "PROJ*C"] {
            let item = f.facilities.assign("FAC", name).unwrap();
            run.add_facility(item);
        }
        run.bind_use_name("X", "PROJ*B");
        f.facilities.fail_release("PROJ*B");

        f.registry.finish_run(&run);
        assert_eq!(f.registry.close_run(&run), 3);
        assert_eq!(f.registry.close_run(&run), 0);

        assert!(run.facility_items().is_empty());
        assert!(run.use_names().is_empty());
        assert_eq!(f.facilities.releases().len(), 3);
        assert_eq!(f.facilities.assigned_to("FAC"), 0);

        let fins = f.flush().iter().filter(|l| l.starts_with("FAC FIN")).count();
        assert_eq!(fins, 1);
    }

    #[test]
    fn test_items_held_after_closeout_fail_the_sweep() {
        let f = fixture();
        let run = f.demand("LEAK");
        f.registry.end_session(&run);
        f.registry.sweep().unwrap();
        assert_eq!(run.state(), RunState::Smoque);

        run.add_facility(f.facilities.assign("LEAK", "PROJ*LATE").unwrap());
        let err = f.registry.sweep().unwrap_err();
        assert_eq!(
            err.stop_code(),
            Some(exec_core::StopCode::InternalConsistency)
        );
        assert!(f.registry.contains("LEAK"));
    }

    #[test]
    fn test_queued_output_delays_destruction() {
        struct Held(AtomicBool);
        impl OutputQueue for Held {
            fn has_queued_output(&self, _run: &str) -> bool {
                self.0.load(Ordering::SeqCst)
            }
        }

        let held = Arc::new(Held(AtomicBool::new(true)));
        let f = fixture_with_output(held.clone());
        let run = f.batch("PRT", Arc::new(QueueIo::new()));
        f.registry.finish_run(&run);
        drop(run);

        f.registry.sweep().unwrap();
        f.registry.sweep().unwrap();
        assert!(f.registry.contains("PRT"));

        held.0.store(false, Ordering::SeqCst);
        f.registry.sweep().unwrap();
        assert!(!f.registry.contains("PRT"));
    }

    #[test]
    fn test_run_info_serializes() {
        let f = fixture();
        let _run = f.demand("INFO");
        let infos = f.registry.runs();
        let json = serde_json::to_value(&infos[0]).unwrap();
        assert_eq!(json["name"], "INFO");
        assert_eq!(json["state"], "ACTIVE");
        assert_eq!(json["status"], "no_error");
        assert_eq!(json["pins"], 1);
    }
}
