//! End-to-end preflight and gate tests for the bw-core binary.
//!
//! Every test runs against a sandboxed fake PATH so outcomes don't depend
//! on the host machine.

use predicates::prelude::*;

mod support;
use support::fake_env;

// ============================================================================
// Standalone preflight command
// ============================================================================

mod preflight_command {
    use super::*;

    #[test]
    fn healthy_environment_passes() {
        let env = fake_env();
        env.bw()
            .arg("preflight")
            .assert()
            .success()
            .stdout(predicate::str::contains("Bulwark preflight report"))
            .stdout(predicate::str::contains("[PASS] runtime_version"))
            .stdout(predicate::str::contains("[PASS] tool_curl"))
            .stdout(predicate::str::contains("Result: PASS"));
    }

    #[test]
    fn missing_required_tool_fails_with_exit_1() {
        let env = fake_env();
        env.remove_tool("curl");
        env.bw()
            .arg("preflight")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("[FAIL] tool_curl"))
            .stdout(predicate::str::contains("Result: FAIL"));
    }

    #[test]
    fn missing_optional_tool_only_warns() {
        let env = fake_env();
        env.remove_tool("pup");
        env.bw()
            .arg("preflight")
            .assert()
            .success()
            .stdout(predicate::str::contains("[WARN] tool_pup"))
            .stdout(predicate::str::contains("Result: PASS"));
    }

    #[test]
    fn version_below_minimum_blocks_when_enforced() {
        let env = fake_env();
        env.write_tool("sw_vers", "#!/bin/sh\necho 26.2\n");
        env.bw()
            .args(["preflight", "--min-macos-version", "26.3", "--enforce-min-version"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("[FAIL] min_macos_version"));
    }

    #[test]
    fn version_below_minimum_passes_when_not_enforced() {
        let env = fake_env();
        env.write_tool("sw_vers", "#!/bin/sh\necho 26.2\n");
        // The config in the sandbox enforces; relax it.
        std::fs::write(
            &env.config,
            format!(
                "preflight:\n  min_macos_version: \"26.3\"\n  enforce_min_version: false\nrollback:\n  backup_location: {}\nscripts:\n  dir: {}\n",
                env.backups.display(),
                env.scripts.display()
            ),
        )
        .unwrap();

        env.bw()
            .arg("preflight")
            .assert()
            .success()
            .stdout(predicate::str::contains("enforcement off"));
    }

    #[test]
    fn require_rules_fails_without_rule_documents() {
        let env = fake_env();
        env.bw()
            .args(["preflight", "--require-rules"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("[FAIL] rule_files"));
    }

    #[test]
    fn require_rules_passes_with_rule_documents() {
        let env = fake_env();
        let rules = env.root().join("rules");
        std::fs::create_dir_all(&rules).unwrap();
        std::fs::write(rules.join("firewall_enable.yaml"), "id: firewall_enable\n").unwrap();

        env.bw()
            .args(["preflight", "--require-rules"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[PASS] rule_files"));
    }

    #[test]
    fn json_output_is_machine_parseable() {
        let env = fake_env();
        let output = env
            .bw()
            .args(["--format", "json", "preflight"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(summary["passed"], true);
        assert!(summary["checks"].as_array().unwrap().len() > 5);
        assert_eq!(summary["failed_required_count"], 0);
    }
}

// ============================================================================
// Gate behavior on mutating commands
// ============================================================================

mod gate {
    use super::*;

    #[test]
    fn blocked_gate_exits_1_and_never_runs_the_script() {
        let env = fake_env();
        env.remove_tool("curl");

        env.bw()
            .args(["harden", "privacy"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("[FAIL] tool_curl"))
            .stderr(predicate::str::contains(
                "Aborting because preflight failed required checks.",
            ));

        // The mutating script must not have been invoked.
        assert!(!env.marker_exists("privacy_ran"));
        // No rollback point was opened either.
        assert!(env.rollback_ids().is_empty());
    }

    #[test]
    fn blocked_gate_emits_json_envelope() {
        let env = fake_env();
        env.remove_tool("jq");

        let output = env
            .bw()
            .args(["--format", "json", "harden", "firewall"])
            .assert()
            .code(1)
            .get_output()
            .stdout
            .clone();

        let envelope: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(envelope["command"], "preflight_gate");
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["summary"]["passed"], false);
    }

    #[test]
    fn passing_gate_runs_script_and_records_rollback_point() {
        let env = fake_env();

        env.bw()
            .args(["harden", "privacy"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Result: PASS"))
            .stdout(predicate::str::contains("Created rollback point privacy_"))
            .stdout(predicate::str::contains("privacy: done"));

        assert!(env.marker_exists("privacy_ran"));

        // One rollback point with the privacy component's tracked settings.
        let ids = env.rollback_ids();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].starts_with("privacy_"));

        let metadata: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(env.backups.join(&ids[0]).join("metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["component"], "privacy");
        assert_eq!(metadata["backups"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn dry_run_skips_rollback_point_and_forwards_flag() {
        let env = fake_env();

        env.bw()
            .args(["--dry-run", "harden", "firewall"])
            .assert()
            .success()
            .stdout(predicate::str::contains("firewall: dry run"));

        assert!(!env.marker_exists("firewall_ran"));
        assert!(env.rollback_ids().is_empty());
    }

    #[test]
    fn fetch_commands_skip_the_gate() {
        let env = fake_env();
        // Break the gate completely; fetch must still run.
        env.remove_tool("curl");
        env.remove_tool("jq");

        env.bw()
            .args(["fetch", "cve"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cve_fetch: done"));
    }

    #[test]
    fn baseline_generate_requires_rule_documents() {
        let env = fake_env();
        env.bw()
            .args(["baseline", "generate", "--keyword", "stig"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("[FAIL] rule_files"));
        assert!(!env.marker_exists("baseline_ran"));
    }

    #[test]
    fn baseline_generate_runs_with_rules_present() {
        let env = fake_env();
        let rules = env.root().join("rules");
        std::fs::create_dir_all(&rules).unwrap();
        std::fs::write(rules.join("os_hardening.yaml"), "id: os_hardening\n").unwrap();

        env.bw()
            .args(["baseline", "generate", "--keyword", "stig"])
            .assert()
            .success()
            .stdout(predicate::str::contains("baseline: done"));
        assert!(env.marker_exists("baseline_ran"));
    }

    #[test]
    fn script_failure_surfaces_exit_code_1() {
        let env = fake_env();
        std::fs::write(
            env.scripts.join("encryption.sh"),
            "#!/bin/sh\necho boom >&2\nexit 7\n",
        )
        .unwrap();

        env.bw()
            .args(["harden", "encryption"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("boom"));
    }
}

// ============================================================================
// Doctor
// ============================================================================

mod doctor {
    use super::*;

    #[test]
    fn doctor_reports_and_exits_by_failures() {
        let env = fake_env();
        // Doctor's preflight pass requires rule documents.
        let rules = env.root().join("rules");
        std::fs::create_dir_all(&rules).unwrap();
        std::fs::write(rules.join("base.yaml"), "id: base\n").unwrap();

        env.bw()
            .arg("doctor")
            .assert()
            .success()
            .stdout(predicate::str::contains("Bulwark Doctor Report"))
            .stdout(predicate::str::contains("[PASS] config_schema"))
            .stdout(predicate::str::contains("[PASS] min_macos_policy"));
    }

    #[test]
    fn doctor_fails_when_dependency_missing() {
        let env = fake_env();
        let rules = env.root().join("rules");
        std::fs::create_dir_all(&rules).unwrap();
        std::fs::write(rules.join("base.yaml"), "id: base\n").unwrap();
        env.remove_tool("jq");

        env.bw()
            .arg("doctor")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("[FAIL] dependency:jq"));
    }
}
