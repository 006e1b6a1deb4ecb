//! The preflight gate.
//!
//! Decides, per invoked command, whether preflight must run before the
//! command is allowed to mutate anything, and with which requirements.
//! The policy is fixed:
//!
//! - hardening script commands always require non-interactive elevation;
//! - baseline actions require rule documents, and `apply` (the only
//!   baseline action that touches live system state) also requires
//!   elevation;
//! - read-only commands skip the gate entirely.
//!
//! The gate itself never exits the process; it returns a [`GateDecision`]
//! and the binary maps `Blocked` to the failure exit code after printing
//! the full report.

use crate::preflight::{Evaluator, PreflightOptions, PreflightSummary};
use crate::probe::CommandRunner;
use bw_config::HardeningConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Hardening script components dispatched to bash scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HardenComponent {
    Privacy,
    Firewall,
    Encryption,
    AppSecurity,
}

impl HardenComponent {
    /// Stable component name used in rollback ids and logs.
    pub fn name(self) -> &'static str {
        match self {
            HardenComponent::Privacy => "privacy",
            HardenComponent::Firewall => "firewall",
            HardenComponent::Encryption => "encryption",
            HardenComponent::AppSecurity => "app_security",
        }
    }

    /// Script file implementing this component.
    pub fn script_file(self) -> &'static str {
        match self {
            HardenComponent::Privacy => "privacy.sh",
            HardenComponent::Firewall => "firewall.sh",
            HardenComponent::Encryption => "encryption.sh",
            HardenComponent::AppSecurity => "app_security.sh",
        }
    }
}

impl std::fmt::Display for HardenComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Baseline rule-engine actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BaselineAction {
    /// Write a baseline document from matching rules.
    Generate,
    /// Write a tailored baseline document.
    Tailor,
    /// Apply fixes to the live system.
    Apply,
}

impl BaselineAction {
    pub fn name(self) -> &'static str {
        match self {
            BaselineAction::Generate => "generate",
            BaselineAction::Tailor => "tailor",
            BaselineAction::Apply => "apply",
        }
    }

    /// Only `apply` mutates live system state; generate/tailor just write
    /// baseline documents.
    pub fn mutates_system(self) -> bool {
        matches!(self, BaselineAction::Apply)
    }
}

impl std::fmt::Display for BaselineAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The operation being dispatched, as the gate sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// A hardening script invocation.
    Harden(HardenComponent),
    /// A baseline rule-engine action.
    Baseline(BaselineAction),
    /// Listings, diagnostics, fetch scripts, rollback management.
    ReadOnly,
}

/// Per-command preflight requirements, or None when the gate is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateRequirements {
    pub require_sudo: bool,
    pub require_rules: bool,
}

/// Classify an operation. This table is the gate policy; keep it in sync
/// with the documented command surface.
pub fn gate_requirements(operation: Operation) -> Option<GateRequirements> {
    match operation {
        Operation::Harden(_) => Some(GateRequirements {
            require_sudo: true,
            require_rules: false,
        }),
        Operation::Baseline(action) => Some(GateRequirements {
            require_sudo: action.mutates_system(),
            require_rules: true,
        }),
        Operation::ReadOnly => None,
    }
}

/// Command-line overrides for the configured gate policy.
#[derive(Debug, Clone, Default)]
pub struct GateOverrides {
    pub min_macos_version: Option<String>,
    pub enforce_min_version: Option<bool>,
}

/// Outcome of the gate for one command dispatch.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// The command does not mutate; no preflight was run.
    Skipped,
    /// Preflight ran and passed; proceed.
    Passed(PreflightSummary),
    /// Preflight failed a required check; the command must not run.
    Blocked(PreflightSummary),
}

impl GateDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GateDecision::Blocked(_))
    }

    pub fn summary(&self) -> Option<&PreflightSummary> {
        match self {
            GateDecision::Skipped => None,
            GateDecision::Passed(s) | GateDecision::Blocked(s) => Some(s),
        }
    }
}

/// Run preflight for the operation if the gate policy demands it.
pub fn maybe_run_preflight(
    runner: &dyn CommandRunner,
    operation: Operation,
    config: &HardeningConfig,
    overrides: &GateOverrides,
) -> GateDecision {
    let Some(requirements) = gate_requirements(operation) else {
        return GateDecision::Skipped;
    };

    let mut opts = PreflightOptions::from_config(
        config,
        requirements.require_sudo,
        requirements.require_rules,
    );
    if let Some(ref min) = overrides.min_macos_version {
        opts.min_macos_version = min.clone();
    }
    if let Some(enforce) = overrides.enforce_min_version {
        opts.enforce_min_version = enforce;
    }

    info!(
        require_sudo = requirements.require_sudo,
        require_rules = requirements.require_rules,
        "gate policy requires preflight"
    );

    let summary = Evaluator::new(runner).run(&opts);
    if summary.passed {
        GateDecision::Passed(summary)
    } else {
        warn!(
            failed_required = summary.failed_required_count,
            "preflight gate blocked the command"
        );
        GateDecision::Blocked(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRunner;

    #[test]
    fn test_harden_commands_require_sudo_not_rules() {
        for component in [
            HardenComponent::Privacy,
            HardenComponent::Firewall,
            HardenComponent::Encryption,
            HardenComponent::AppSecurity,
        ] {
            let req = gate_requirements(Operation::Harden(component)).unwrap();
            assert!(req.require_sudo);
            assert!(!req.require_rules);
        }
    }

    #[test]
    fn test_baseline_actions_require_rules() {
        let generate = gate_requirements(Operation::Baseline(BaselineAction::Generate)).unwrap();
        assert!(!generate.require_sudo);
        assert!(generate.require_rules);

        let tailor = gate_requirements(Operation::Baseline(BaselineAction::Tailor)).unwrap();
        assert!(!tailor.require_sudo);
        assert!(tailor.require_rules);

        let apply = gate_requirements(Operation::Baseline(BaselineAction::Apply)).unwrap();
        assert!(apply.require_sudo);
        assert!(apply.require_rules);
    }

    #[test]
    fn test_read_only_skips_gate() {
        assert!(gate_requirements(Operation::ReadOnly).is_none());

        let runner = ScriptedRunner::new();
        let decision = maybe_run_preflight(
            &runner,
            Operation::ReadOnly,
            &HardeningConfig::default(),
            &GateOverrides::default(),
        );
        assert!(matches!(decision, GateDecision::Skipped));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_blocked_when_required_tool_missing() {
        // No probes scripted: every external probe fails, so required
        // checks fail and the gate must block.
        let runner = ScriptedRunner::new();
        let decision = maybe_run_preflight(
            &runner,
            Operation::Harden(HardenComponent::Firewall),
            &HardeningConfig::default(),
            &GateOverrides::default(),
        );
        assert!(decision.is_blocked());
        let summary = decision.summary().unwrap();
        assert!(!summary.passed);
        assert!(summary.failed_required_count > 0);
    }

    #[test]
    fn test_overrides_take_precedence_over_policy() {
        let runner = ScriptedRunner::new()
            .ok("bash --version", "GNU bash, version 5.2.37(1)-release")
            .ok("sw_vers -productVersion", "12.6")
            .ok("which curl", "/usr/bin/curl")
            .ok("which jq", "/usr/bin/jq")
            .ok("which pup", "/usr/bin/pup");

        let mut config = HardeningConfig::default();
        config.preflight.enforce_min_version = true; // would block on 12.6

        let overrides = GateOverrides {
            min_macos_version: Some("12.0".to_string()),
            enforce_min_version: Some(true),
        };
        let decision = maybe_run_preflight(
            &runner,
            Operation::Baseline(BaselineAction::Generate),
            &config,
            &overrides,
        );

        // 12.6 >= 12.0, and generate does not need sudo: the version check
        // passes under the override even though policy minimum is higher.
        let summary = decision.summary().unwrap();
        let version_check = summary
            .checks
            .iter()
            .find(|c| c.name == "min_macos_version")
            .unwrap();
        assert_eq!(version_check.status, crate::preflight::CheckStatus::Pass);
    }

    #[test]
    fn test_component_names_and_scripts() {
        assert_eq!(HardenComponent::AppSecurity.name(), "app_security");
        assert_eq!(HardenComponent::AppSecurity.script_file(), "app_security.sh");
        assert_eq!(BaselineAction::Apply.name(), "apply");
        assert!(BaselineAction::Apply.mutates_system());
        assert!(!BaselineAction::Generate.mutates_system());
    }
}
