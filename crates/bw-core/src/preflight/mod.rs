//! Preflight environment evaluation.
//!
//! Runs a fixed battery of environment checks (interpreter availability,
//! OS family, external tools, privileges, config/rule presence, pinned-OS
//! diagnostic signatures, minimum-version policy) and produces a
//! [`PreflightSummary`] with one [`PreflightCheck`] per probe.
//!
//! The evaluator never returns an error and never panics: every probe
//! failure (missing binary, non-zero exit, timeout) degrades to a FAIL or
//! WARN check. The single gate predicate is [`PreflightSummary::passed`]:
//! true iff no required check has status FAIL.

mod checks;

use crate::probe::CommandRunner;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use checks::version_tuple;

/// The OS version whose diagnostic output signatures are pinned.
///
/// On exactly this version, preflight additionally verifies that the
/// firewall-state and Gatekeeper-status commands still produce output in
/// the shape downstream hardening logic parses.
pub const PINNED_SIGNATURE_VERSION: &str = "26.3";

/// Minimum supported script interpreter (bash) version.
pub const MIN_BASH_VERSION: (u32, u32) = (3, 2);

/// Status of one preflight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "PASS"),
            CheckStatus::Warn => write!(f, "WARN"),
            CheckStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// One evaluated environment check.
///
/// `required` is true only when a FAIL must block mutating operations.
/// A WARN never blocks, whatever `required` says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub required: bool,
}

impl PreflightCheck {
    pub fn pass(name: &str, message: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
            required,
        }
    }

    pub fn warn(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            message: message.into(),
            required: false,
        }
    }

    pub fn fail(name: &str, message: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            message: message.into(),
            required,
        }
    }

    /// True when this check alone blocks the gate.
    pub fn blocks_gate(&self) -> bool {
        self.status == CheckStatus::Fail && self.required
    }
}

/// Requested preflight policy plus ambient environment knobs.
#[derive(Debug, Clone)]
pub struct PreflightOptions {
    /// Root directory for config/rule/profile lookups (None = BW_ROOT or cwd).
    pub root_dir: Option<PathBuf>,
    /// Verify root or non-interactive sudo.
    pub require_sudo: bool,
    /// Require at least one rule document.
    pub require_rules: bool,
    /// Minimum macOS version threshold.
    pub min_macos_version: String,
    /// Whether falling below the minimum blocks the gate.
    pub enforce_min_version: bool,
    /// Tools whose absence fails a required check.
    pub required_tools: Vec<String>,
    /// Tools whose absence only warns.
    pub optional_tools: Vec<String>,
}

impl PreflightOptions {
    /// Build options from the loaded configuration and gate flags.
    pub fn from_config(
        config: &bw_config::HardeningConfig,
        require_sudo: bool,
        require_rules: bool,
    ) -> Self {
        Self {
            root_dir: None,
            require_sudo,
            require_rules,
            min_macos_version: config.preflight.min_macos_version.clone(),
            enforce_min_version: config.preflight.enforce_min_version,
            required_tools: config.dependencies.required.clone(),
            optional_tools: config.dependencies.optional.clone(),
        }
    }
}

/// Structured result of one preflight run. Recomputed on every invocation,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightSummary {
    pub root_dir: PathBuf,
    pub require_sudo: bool,
    pub require_rules: bool,
    pub checks: Vec<PreflightCheck>,
    pub passed: bool,
    pub failed_required_count: usize,
    pub warning_count: usize,
}

impl PreflightSummary {
    fn from_checks(
        root_dir: PathBuf,
        require_sudo: bool,
        require_rules: bool,
        checks: Vec<PreflightCheck>,
    ) -> Self {
        let failed_required_count = checks.iter().filter(|c| c.blocks_gate()).count();
        let warning_count = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warn)
            .count();
        Self {
            root_dir,
            require_sudo,
            require_rules,
            passed: failed_required_count == 0,
            failed_required_count,
            warning_count,
            checks,
        }
    }

    /// Serialize the summary as pretty JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Format a readable preflight report.
pub fn format_preflight_report(summary: &PreflightSummary) -> String {
    let mut lines = vec![
        "Bulwark preflight report".to_string(),
        format!("Root directory: {}", summary.root_dir.display()),
    ];
    for check in &summary.checks {
        lines.push(format!(
            "[{}] {}: {}",
            check.status, check.name, check.message
        ));
    }
    lines.push(format!(
        "Result: {} (required failures: {}, warnings: {})",
        if summary.passed { "PASS" } else { "FAIL" },
        summary.failed_required_count,
        summary.warning_count
    ));
    lines.join("\n")
}

/// The preflight evaluator.
pub struct Evaluator<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Evaluator<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Run the full check battery.
    ///
    /// Check order is stable so reports are reproducible.
    pub fn run(&self, opts: &PreflightOptions) -> PreflightSummary {
        let root_dir = resolve_root_dir(opts.root_dir.as_deref());
        debug!(root_dir = %root_dir.display(), "running preflight");

        let detected_version = checks::detect_macos_version(self.runner);
        let is_root = effective_uid() == 0;

        let mut all = Vec::new();
        all.push(checks::check_runtime_interpreter(self.runner));
        all.push(checks::check_os_target(detected_version.as_deref()));
        for tool in &opts.required_tools {
            all.push(checks::check_tool(self.runner, tool, true));
        }
        for tool in &opts.optional_tools {
            all.push(checks::check_tool(self.runner, tool, false));
        }
        all.push(checks::check_sudo_or_root(
            self.runner,
            opts.require_sudo,
            is_root,
        ));
        all.push(checks::check_config_file(&root_dir));
        all.push(checks::check_rule_dirs(&root_dir, opts.require_rules));
        all.push(checks::check_profile_pack(&root_dir));
        all.extend(checks::check_version_signatures(
            self.runner,
            detected_version.as_deref(),
        ));
        all.push(checks::check_min_version(
            detected_version.as_deref(),
            &opts.min_macos_version,
            opts.enforce_min_version,
        ));

        let summary = PreflightSummary::from_checks(
            root_dir,
            opts.require_sudo,
            opts.require_rules,
            all,
        );
        info!(
            passed = summary.passed,
            failed_required = summary.failed_required_count,
            warnings = summary.warning_count,
            "preflight complete"
        );
        summary
    }
}

/// Resolve the root directory: explicit > BW_ROOT > cwd.
fn resolve_root_dir(explicit: Option<&Path>) -> PathBuf {
    let candidate = explicit
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("BW_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    candidate
        .canonicalize()
        .unwrap_or(candidate)
}

fn effective_uid() -> u32 {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() }
    }
    #[cfg(not(unix))]
    {
        u32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRunner;
    use std::fs;

    fn base_options(root: &Path) -> PreflightOptions {
        PreflightOptions {
            root_dir: Some(root.to_path_buf()),
            require_sudo: false,
            require_rules: false,
            min_macos_version: "26.3".to_string(),
            enforce_min_version: false,
            required_tools: vec!["curl".to_string(), "jq".to_string()],
            optional_tools: vec!["pup".to_string()],
        }
    }

    fn happy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .ok("bash --version", "GNU bash, version 5.2.37(1)-release")
            .ok("sw_vers -productVersion", "26.3")
            .ok("which curl", "/usr/bin/curl")
            .ok("which jq", "/opt/homebrew/bin/jq")
            .ok("which pup", "/opt/homebrew/bin/pup")
            .ok(
                "/usr/libexec/ApplicationFirewall/socketfilterfw --getglobalstate",
                "Firewall is enabled. (State = 1)",
            )
            .ok("spctl --status", "assessments enabled")
    }

    #[test]
    fn test_all_pass_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = happy_runner();
        let summary = Evaluator::new(&runner).run(&base_options(tmp.path()));

        assert!(summary.passed);
        assert_eq!(summary.failed_required_count, 0);
        // config_file and profile_pack warn on an empty root; rule_files warns
        // because require_rules is off and no rules exist.
        assert!(summary.warning_count >= 2);
        let names: Vec<_> = summary.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "runtime_version");
        assert!(names.contains(&"tool_curl"));
        assert!(names.contains(&"min_macos_version"));
    }

    #[test]
    fn test_gate_predicate_matches_required_failures() {
        let tmp = tempfile::tempdir().unwrap();
        // jq missing: "which jq" is not scripted, so the probe errors out.
        let runner = ScriptedRunner::new()
            .ok("bash --version", "GNU bash, version 5.2.37(1)-release")
            .ok("sw_vers -productVersion", "26.3")
            .ok("which curl", "/usr/bin/curl")
            .ok("which pup", "/opt/homebrew/bin/pup")
            .ok(
                "/usr/libexec/ApplicationFirewall/socketfilterfw --getglobalstate",
                "Firewall is enabled. (State = 1)",
            )
            .ok("spctl --status", "assessments enabled");
        let summary = Evaluator::new(&runner).run(&base_options(tmp.path()));

        assert!(!summary.passed);
        let jq = summary
            .checks
            .iter()
            .find(|c| c.name == "tool_jq")
            .unwrap();
        assert_eq!(jq.status, CheckStatus::Fail);
        assert!(jq.required);
        assert_eq!(
            summary.failed_required_count,
            summary.checks.iter().filter(|c| c.blocks_gate()).count()
        );
    }

    #[test]
    fn test_optional_tool_missing_only_warns() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok("bash --version", "GNU bash, version 5.2.37(1)-release")
            .ok("sw_vers -productVersion", "26.3")
            .ok("which curl", "/usr/bin/curl")
            .ok("which jq", "/opt/homebrew/bin/jq")
            .ok(
                "/usr/libexec/ApplicationFirewall/socketfilterfw --getglobalstate",
                "Firewall is enabled. (State = 1)",
            )
            .ok("spctl --status", "assessments enabled");
        let summary = Evaluator::new(&runner).run(&base_options(tmp.path()));

        assert!(summary.passed);
        let pup = summary
            .checks
            .iter()
            .find(|c| c.name == "tool_pup")
            .unwrap();
        assert_eq!(pup.status, CheckStatus::Warn);
        assert!(!pup.required);
    }

    #[test]
    fn test_version_gate_enforced_below_minimum() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok("bash --version", "GNU bash, version 5.2.37(1)-release")
            .ok("sw_vers -productVersion", "26.2")
            .ok("which curl", "/usr/bin/curl")
            .ok("which jq", "/opt/homebrew/bin/jq")
            .ok("which pup", "/opt/homebrew/bin/pup");
        let mut opts = base_options(tmp.path());
        opts.enforce_min_version = true;

        let summary = Evaluator::new(&runner).run(&opts);
        assert!(!summary.passed);
        let check = summary
            .checks
            .iter()
            .find(|c| c.name == "min_macos_version")
            .unwrap();
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.required);
    }

    #[test]
    fn test_version_gate_unenforced_never_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok("bash --version", "GNU bash, version 5.2.37(1)-release")
            .ok("sw_vers -productVersion", "26.2")
            .ok("which curl", "/usr/bin/curl")
            .ok("which jq", "/opt/homebrew/bin/jq")
            .ok("which pup", "/opt/homebrew/bin/pup");
        let summary = Evaluator::new(&runner).run(&base_options(tmp.path()));

        assert!(summary.passed);
        let check = summary
            .checks
            .iter()
            .find(|c| c.name == "min_macos_version")
            .unwrap();
        assert!(!check.required);
    }

    #[test]
    fn test_rule_files_required_and_present() {
        let tmp = tempfile::tempdir().unwrap();
        let rules = tmp.path().join("rules/os");
        fs::create_dir_all(&rules).unwrap();
        fs::write(rules.join("firewall_enable.yaml"), "id: firewall_enable\n").unwrap();

        let runner = happy_runner();
        let mut opts = base_options(tmp.path());
        opts.require_rules = true;

        let summary = Evaluator::new(&runner).run(&opts);
        let check = summary
            .checks
            .iter()
            .find(|c| c.name == "rule_files")
            .unwrap();
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(check.required);
        assert!(summary.passed);
    }

    #[test]
    fn test_rule_files_required_and_absent_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = happy_runner();
        let mut opts = base_options(tmp.path());
        opts.require_rules = true;

        let summary = Evaluator::new(&runner).run(&opts);
        assert!(!summary.passed);
        let check = summary
            .checks
            .iter()
            .find(|c| c.name == "rule_files")
            .unwrap();
        assert!(check.blocks_gate());
    }

    #[test]
    fn test_signature_mismatch_warns_only() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok("bash --version", "GNU bash, version 5.2.37(1)-release")
            .ok("sw_vers -productVersion", "26.3")
            .ok("which curl", "/usr/bin/curl")
            .ok("which jq", "/opt/homebrew/bin/jq")
            .ok("which pup", "/opt/homebrew/bin/pup")
            .ok(
                "/usr/libexec/ApplicationFirewall/socketfilterfw --getglobalstate",
                "totally new output format",
            )
            .ok("spctl --status", "assessments enabled");
        let summary = Evaluator::new(&runner).run(&base_options(tmp.path()));

        assert!(summary.passed);
        let check = summary
            .checks
            .iter()
            .find(|c| c.name == "signature_firewall")
            .unwrap();
        assert_eq!(check.status, CheckStatus::Warn);
    }

    #[test]
    fn test_evaluator_never_errors_on_probe_chaos() {
        // Nothing scripted at all: every probe fails. The evaluator must
        // still return a summary with checks, not panic or error.
        let tmp = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let mut opts = base_options(tmp.path());
        opts.enforce_min_version = true;

        let summary = Evaluator::new(&runner).run(&opts);
        assert!(!summary.passed);
        assert!(!summary.checks.is_empty());
    }

    #[test]
    fn test_report_formatting() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = happy_runner();
        let summary = Evaluator::new(&runner).run(&base_options(tmp.path()));
        let report = format_preflight_report(&summary);

        assert!(report.starts_with("Bulwark preflight report"));
        assert!(report.contains("[PASS] runtime_version:"));
        assert!(report.contains("Result: PASS"));
    }

    #[test]
    fn test_summary_json_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = happy_runner();
        let summary = Evaluator::new(&runner).run(&base_options(tmp.path()));

        let parsed: PreflightSummary = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(parsed.passed, summary.passed);
        assert_eq!(parsed.checks.len(), summary.checks.len());
    }
}
