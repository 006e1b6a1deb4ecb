//! Consolidated diagnostics.
//!
//! `doctor` bundles everything an operator needs to judge host readiness:
//! config schema validity, a non-gating preflight pass, dependency
//! presence, script existence and permissions, and the minimum-version
//! policy comparison. Unlike the gate, doctor never aborts anything; it
//! reports and exits by failure count.

use crate::gate::HardenComponent;
use crate::preflight::{self, Evaluator, PreflightOptions};
use crate::probe::{CommandRunner, ProbeSpec};
use crate::script::FetchTask;
use bw_config::HardeningConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One doctor check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// The full doctor report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
    pub failures: usize,
}

impl DoctorReport {
    pub fn success(&self) -> bool {
        self.failures == 0
    }

    pub fn format_text(&self) -> String {
        let mut lines = vec![
            "Bulwark Doctor Report".to_string(),
            "=====================".to_string(),
        ];
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            lines.push(format!("[{}] {}: {}", status, check.name, check.detail));
        }
        lines.push("---------------------".to_string());
        lines.push(format!(
            "Checks: {}  Failures: {}",
            self.checks.len(),
            self.failures
        ));
        lines.join("\n")
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Run the full diagnostic battery.
pub fn run_doctor(runner: &dyn CommandRunner, config: &HardeningConfig) -> DoctorReport {
    let mut checks = Vec::new();

    // Config schema.
    match config.validate() {
        Ok(()) => checks.push(DoctorCheck {
            name: "config_schema".to_string(),
            passed: true,
            detail: "valid".to_string(),
        }),
        Err(e) => checks.push(DoctorCheck {
            name: "config_schema".to_string(),
            passed: false,
            detail: e.to_string(),
        }),
    }

    // Non-gating preflight pass, with rules required so baseline readiness
    // is visible.
    let summary = Evaluator::new(runner).run(&PreflightOptions::from_config(config, false, true));
    checks.push(DoctorCheck {
        name: "preflight".to_string(),
        passed: summary.passed,
        detail: format!(
            "required_failures={}, warnings={}",
            summary.failed_required_count, summary.warning_count
        ),
    });

    // Dependency presence.
    for tool in &config.dependencies.required {
        let present = runner
            .run(&ProbeSpec::new("which", &[tool]).with_timeout(Duration::from_secs(5)))
            .map(|o| o.success())
            .unwrap_or(false);
        checks.push(DoctorCheck {
            name: format!("dependency:{}", tool),
            passed: present,
            detail: if present { "present" } else { "missing" }.to_string(),
        });
    }

    // Script presence and permissions.
    let mut scripts: Vec<(&str, String)> = Vec::new();
    for component in [
        HardenComponent::Privacy,
        HardenComponent::Firewall,
        HardenComponent::Encryption,
        HardenComponent::AppSecurity,
    ] {
        scripts.push((component.name(), component.script_file().to_string()));
    }
    for task in [FetchTask::Cve, FetchTask::AppleUpdates] {
        scripts.push((task.name(), task.script_file().to_string()));
    }
    scripts.push(("baseline", config.scripts.baseline.clone()));

    for (name, file) in scripts {
        let path = config.scripts.dir.join(&file);
        let exists = path.is_file();
        checks.push(DoctorCheck {
            name: format!("script_exists:{}", name),
            passed: exists,
            detail: path.display().to_string(),
        });
        checks.push(DoctorCheck {
            name: format!("script_executable:{}", name),
            passed: exists && is_executable(&path),
            detail: path.display().to_string(),
        });
    }

    // Minimum-version policy.
    let detected = detect_version(runner);
    let meets = detected
        .as_deref()
        .map(|v| preflight::version_tuple(v) >= preflight::version_tuple(&config.preflight.min_macos_version))
        .unwrap_or(false);
    checks.push(DoctorCheck {
        name: "min_macos_policy".to_string(),
        passed: meets,
        detail: format!(
            "current={}, min={}",
            detected.as_deref().unwrap_or("unknown"),
            config.preflight.min_macos_version
        ),
    });

    let failures = checks.iter().filter(|c| !c.passed).count();
    DoctorReport { checks, failures }
}

fn detect_version(runner: &dyn CommandRunner) -> Option<String> {
    runner
        .run(&ProbeSpec::new("sw_vers", &["-productVersion"]).with_timeout(Duration::from_secs(5)))
        .ok()
        .filter(|o| o.success())
        .map(|o| o.stdout_str())
        .filter(|v| !v.is_empty())
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
