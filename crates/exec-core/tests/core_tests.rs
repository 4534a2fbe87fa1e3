#[cfg(test)]
mod tests {
    use exec_core::fieldata;
    use exec_core::ident::{self, IdentKind, KEY_CHARSET};
    use exec_core::*;

    // ── Identifier grammar tests ───────────────────────────────

    #[test]
    fn test_run_id_accepts_alphanumeric() {
        assert!(ident::validate_run_id("RUN000").is_ok());
        assert!(ident::validate_run_id("a").is_ok());
        assert!(ident::validate_run_id("ABCDEFGHIJKL").is_ok());
    }

    #[test]
    fn test_run_id_rejects_bad_input() {
        assert!(ident::validate_run_id("").is_err());
        assert!(ident::validate_run_id("ABCDEFGHIJKLM").is_err());
        assert!(ident::validate_run_id("RUN-1").is_err());
        assert!(ident::validate_run_id("RUN 1").is_err());
    }

    #[test]
    fn test_account_and_user_allow_period_not_dollar() {
        assert!(ident::validate_account_id("ACCT.1-X").is_ok());
        assert!(ident::validate_user_id("JOE.SMITH").is_ok());
        assert!(ident::validate_account_id("ACCT$").is_err());
        assert!(ident::validate_user_id("JOE$").is_err());
    }

    #[test]
    fn test_project_qualifier_filename_allow_dollar_not_period() {
        assert!(ident::validate_project_id("SYS$").is_ok());
        assert!(ident::validate_qualifier("SYS$LIB-1").is_ok());
        assert!(ident::validate_filename("RUN$").is_ok());
        assert!(ident::validate_project_id("A.B").is_err());
        assert!(ident::validate_filename("A.B").is_err());
    }

    #[test]
    fn test_key_charset_has_68_characters() {
        assert_eq!(KEY_CHARSET.chars().count(), 68);
        for c in KEY_CHARSET.chars() {
            assert!(ident::validate_key(&c.to_string()).is_ok(), "{c:?} rejected");
        }
    }

    #[test]
    fn test_key_length_and_exclusions() {
        assert!(ident::validate_key("ABC#1").is_ok());
        assert!(ident::validate_key("ABCDEFG").is_err());
        assert!(ident::validate_key("A B").is_err());
        assert!(ident::validate_key("A/B").is_err());
        assert!(ident::validate_key("A\tB").is_err());
    }

    #[test]
    fn test_invalid_field_names_the_grammar() {
        let err = ident::validate_project_id("A.B").unwrap_err();
        let s = err.to_string();
        assert!(s.contains("project-id"));
        assert!(s.contains("'.'"));
    }

    #[test]
    fn test_ident_kind_from_str() {
        assert_eq!("RUN-ID".parse::<IdentKind>().unwrap(), IdentKind::RunId);
        assert_eq!("account".parse::<IdentKind>().unwrap(), IdentKind::AccountId);
        assert_eq!("key".parse::<IdentKind>().unwrap(), IdentKind::Key);
        assert!("nonsense".parse::<IdentKind>().is_err());
    }

    // ── Fieldata tests ─────────────────────────────────────────

    #[test]
    fn test_fieldata_letters_and_digits() {
        assert_eq!(fieldata::encode_char('A'), 0o06);
        assert_eq!(fieldata::encode_char('Z'), 0o37);
        assert_eq!(fieldata::encode_char('0'), 0o60);
        assert_eq!(fieldata::encode_char('9'), 0o71);
        assert_eq!(fieldata::encode_char(' '), 0o05);
        assert_eq!(fieldata::encode_char('a'), 0o06);
    }

    #[test]
    fn test_pack_word_space_fills() {
        assert_eq!(fieldata::pack_word(""), 0o050505050505);
        assert_eq!(fieldata::pack_word("A"), 0o060505050505);
        assert_eq!(fieldata::unpack_word(fieldata::pack_word("term1")), "TERM1 ");
    }

    #[test]
    fn test_pack_word_truncates_to_six() {
        assert_eq!(fieldata::pack_word("ABCDEFGH"), fieldata::pack_word("ABCDEF"));
        assert!(fieldata::pack_word("ZZZZZZ") <= fieldata::WORD_MASK);
    }

    // ── Stop code tests ────────────────────────────────────────

    #[test]
    fn test_stop_codes_are_distinct() {
        let mut codes: Vec<u8> = StopCode::ALL.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), StopCode::ALL.len());
    }

    #[test]
    fn test_stop_code_display() {
        let s = StopCode::RunNameExhausted.to_string();
        assert!(s.starts_with("013"));
        assert!(s.contains("DUPLICATE RUN NAME"));
        assert!(!StopCode::OperatorShutdown.is_fault());
        assert!(StopCode::InternalConsistency.is_fault());
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_stop_code_escalation() {
        let err = ExecError::NameSpaceExhausted("ABC".into());
        assert_eq!(err.stop_code(), Some(StopCode::RunNameExhausted));
        let err = ExecError::MainConsoleInUse("SYSCON".into());
        assert_eq!(err.stop_code(), Some(StopCode::MainConsoleUnregistered));
        assert_eq!(ExecError::RunNotFound("X".into()).stop_code(), None);
    }

    #[test]
    fn test_error_display() {
        let err = ExecError::DuplicateConsoleName("TERM1".into());
        assert!(err.to_string().contains("TERM1"));
        let err = ExecError::Stopped(StopCode::ManagerStartFailure);
        assert!(err.to_string().contains("MANAGER START FAILURE"));
    }

    // ── Event bus tests ────────────────────────────────────────

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(ExecEvent::RunDestroyed { name: "RUN000".into() });
        match rx.recv().await.unwrap() {
            ExecEvent::RunDestroyed { name } => assert_eq!(name, "RUN000"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_event_bus_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(ExecEvent::Shutdown);
    }

    #[test]
    fn test_event_serde_tag() {
        let json = serde_json::to_string(&ExecEvent::Shutdown).unwrap();
        assert_eq!(json, r#"{"kind":"shutdown"}"#);
    }
}
