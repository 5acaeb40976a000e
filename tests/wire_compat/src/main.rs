fn main() {
    println!("Run `cargo test -p fzm-wire-compat` to check the push event fixtures.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use fzm_console_log::{LogEntry, LogLevel, LogMultiplexer};
    use fzm_protocol::{OptionsKind, RunState, ServerEvent};
    use fzm_sync::{Aggregate, Synchronizer};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn parse_fixture(name: &str) -> ServerEvent {
        let text = read_fixture(name);
        ServerEvent::parse(text.trim())
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Decodes a fixture, re-encodes it and compares the JSON values
    /// (key order does not matter).
    fn roundtrip_test(name: &str) {
        let fixture: serde_json::Value = serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("fixture {name} is not JSON: {e}"));
        let event = parse_fixture(name);
        let reserialized = serde_json::to_value(&event)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  ours: {reserialized}"
        );
    }

    // --- single events ---

    #[test]
    fn canonical_events_roundtrip() {
        for name in [
            "visit.json",
            "options_regions.json",
            "options_versions.json",
            "options_saves.json",
            "mods.json",
            "running.json",
            "stopping.json",
            "idle.json",
            "slot.json",
            "log.json",
            "info.json",
        ] {
            roundtrip_test(name);
        }
    }

    #[test]
    fn option_sets_keep_service_order() {
        let ServerEvent::Options { name, options } = parse_fixture("options_regions.json") else {
            panic!("expected options");
        };
        assert_eq!(name, OptionsKind::Regions);
        let keys: Vec<&str> = options.keys().collect();
        assert_eq!(keys, vec!["eu-central-1", "us-east-1", "ap-southeast-2"]);
    }

    #[test]
    fn numeric_launch_id_becomes_text() {
        assert_eq!(
            parse_fixture("starting_numeric_id.json"),
            ServerEvent::Starting {
                launch_id: Some("48213".into())
            }
        );
    }

    #[test]
    fn null_line_is_empty() {
        assert_eq!(
            parse_fixture("error_null_line.json"),
            ServerEvent::Error {
                line: String::new()
            }
        );
    }

    #[test]
    fn unknown_type_is_tolerated() {
        assert_eq!(parse_fixture("unknown_type.json"), ServerEvent::Unknown);
    }

    // --- replay ---

    #[test]
    fn session_replay_builds_expected_state() {
        let log = LogMultiplexer::new();
        let sync = Synchronizer::new(None, log.clone());

        for (i, line) in read_fixture("session.jsonl").lines().enumerate() {
            let event = ServerEvent::parse(line)
                .unwrap_or_else(|e| panic!("session.jsonl line {}: {e}", i + 1));
            sync.apply(&event);
        }

        assert!(sync.is_settled(Aggregate::Mods));
        assert!(sync.is_settled(Aggregate::Saves));

        let session = sync.session();
        assert_eq!(session.visit_secret.as_deref(), Some("3f9c2a71e4b0"));
        assert_eq!(session.run_state, RunState::Running);
        // The running event carried no id; the one from starting is kept.
        assert_eq!(session.launch_id.as_deref(), Some("48213"));
        assert_eq!(session.server_address.as_deref(), Some("203.0.113.7:34197"));

        assert_eq!(sync.regions().len(), 2);
        assert_eq!(sync.versions().keys().next(), Some("1.1.110"));
        assert_eq!(sync.mods().len(), 1);

        let remote = sync.remote_slots();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].key, "slot2");

        let history = log.history();
        let nums: Vec<Option<u64>> = history.iter().map(|e| e.num).collect();
        assert_eq!(nums, vec![None, Some(1), Some(2), Some(3)]);
        assert_eq!(history[0], LogEntry::info("info instance launched"));
        assert_eq!(history[0].level, LogLevel::Info);
    }
}
