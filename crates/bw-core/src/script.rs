//! Hardening and fetch script dispatch.
//!
//! The bash scripts are external collaborators: the orchestrator resolves
//! them under the configured scripts directory, invokes them with `bash`,
//! forwards `--dry-run`, and reports exit code plus captured output. It
//! never inspects what the scripts do.
//!
//! Before a (non-dry-run) hardening script runs, the caller opens a
//! rollback point and captures the component's tracked settings through
//! the rollback manager, so the mutation the script is about to make has
//! an undo record.

use crate::gate::HardenComponent;
use crate::probe::{CommandRunner, ProbeSpec};
use bw_common::error::{Error, Result};
use bw_config::ScriptSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Scripts may legitimately run for minutes (softwareupdate, fdesetup).
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(600);

/// Read-only fetch tasks dispatched to scripts; never gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FetchTask {
    /// Fetch current CVE advisories.
    Cve,
    /// Fetch available Apple security updates.
    AppleUpdates,
}

impl FetchTask {
    pub fn name(self) -> &'static str {
        match self {
            FetchTask::Cve => "cve_fetch",
            FetchTask::AppleUpdates => "apple_updates",
        }
    }

    pub fn script_file(self) -> &'static str {
        match self {
            FetchTask::Cve => "cve_fetch.sh",
            FetchTask::AppleUpdates => "apple_updates.sh",
        }
    }
}

/// Result of one script invocation, JSON-serializable for `--format json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
    pub script: String,
    pub args: Vec<String>,
    pub success: bool,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutcome {
    /// Stdout followed by stderr, for human output on failure.
    pub fn details(&self) -> String {
        let parts: Vec<&str> = [self.stderr.as_str(), self.stdout.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        }
    }
}

/// One setting a hardening component is known to touch.
///
/// Captured into the open rollback point strictly before the script runs.
#[derive(Debug, Clone)]
pub enum TrackedSetting {
    Defaults {
        domain: &'static str,
        key: &'static str,
        use_sudo: bool,
    },
    System {
        name: &'static str,
        check: ProbeSpec,
    },
    Service {
        name: &'static str,
    },
}

/// Settings each hardening script is known to mutate.
pub fn tracked_settings(component: HardenComponent) -> Vec<TrackedSetting> {
    match component {
        HardenComponent::Privacy => vec![
            TrackedSetting::Defaults {
                domain: "com.apple.Safari",
                key: "UniversalSearchEnabled",
                use_sudo: false,
            },
            TrackedSetting::Defaults {
                domain: "com.apple.AdLib",
                key: "allowApplePersonalizedAdvertising",
                use_sudo: false,
            },
        ],
        HardenComponent::Firewall => vec![
            TrackedSetting::Defaults {
                domain: "/Library/Preferences/com.apple.alf",
                key: "globalstate",
                use_sudo: true,
            },
            TrackedSetting::Defaults {
                domain: "/Library/Preferences/com.apple.alf",
                key: "stealthenabled",
                use_sudo: true,
            },
        ],
        HardenComponent::Encryption => vec![TrackedSetting::System {
            name: "filevault",
            check: ProbeSpec::new("fdesetup", &["status"]),
        }],
        HardenComponent::AppSecurity => vec![TrackedSetting::System {
            name: "gatekeeper",
            check: ProbeSpec::new("spctl", &["--status"]),
        }],
    }
}

/// Capture a component's tracked settings into an open rollback point.
///
/// Best effort: a failed capture is logged loudly so the operator knows
/// undo coverage is degraded, but it never blocks hardening.
pub fn capture_tracked_settings(
    manager: &crate::rollback::RollbackManager<'_>,
    rollback_id: &bw_common::RollbackId,
    component: HardenComponent,
) -> usize {
    let mut captured = 0;
    for setting in tracked_settings(component) {
        let result = match &setting {
            TrackedSetting::Defaults {
                domain,
                key,
                use_sudo,
            } => manager.backup_defaults_setting(rollback_id, domain, key, *use_sudo),
            TrackedSetting::System { name, check } => {
                manager.backup_system_setting(rollback_id, name, check)
            }
            TrackedSetting::Service { name } => manager.backup_service_state(rollback_id, name),
        };
        match result {
            Ok(outcome) if outcome.recorded() => captured += 1,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    component = %component,
                    error = %e,
                    "setting capture failed; hardening continues without this undo record"
                );
            }
        }
    }
    captured
}

/// Resolve a script path under the configured directory.
fn resolve_script(settings: &ScriptSettings, file: &str) -> Result<PathBuf> {
    let path = settings.dir.join(file);
    if !path.is_file() {
        return Err(Error::ScriptMissing(path.display().to_string()));
    }
    Ok(path)
}

/// Run one script through bash with captured output.
fn run_script(
    runner: &dyn CommandRunner,
    path: &PathBuf,
    extra_args: &[String],
    dry_run: bool,
) -> Result<ScriptOutcome> {
    let mut args: Vec<String> = vec![path.display().to_string()];
    args.extend(extra_args.iter().cloned());
    if dry_run {
        args.push("--dry-run".to_string());
    }

    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let spec = ProbeSpec::new("bash", &arg_refs).with_timeout(SCRIPT_TIMEOUT);

    info!(script = %path.display(), dry_run, "running script");
    let output = runner
        .run(&spec)
        .map_err(|e| Error::ProbeFailed(e.to_string()))?;

    Ok(ScriptOutcome {
        script: path.display().to_string(),
        args: extra_args.to_vec(),
        success: output.success(),
        returncode: output.exit_code.unwrap_or(-1),
        stdout: output.stdout_str(),
        stderr: output.stderr_str(),
    })
}

/// Run a hardening component's script.
pub fn run_hardening_script(
    runner: &dyn CommandRunner,
    settings: &ScriptSettings,
    component: HardenComponent,
    extra_args: &[String],
    dry_run: bool,
) -> Result<ScriptOutcome> {
    let path = resolve_script(settings, component.script_file())?;
    run_script(runner, &path, extra_args, dry_run)
}

/// Run a read-only fetch script.
pub fn run_fetch_script(
    runner: &dyn CommandRunner,
    settings: &ScriptSettings,
    task: FetchTask,
) -> Result<ScriptOutcome> {
    let path = resolve_script(settings, task.script_file())?;
    run_script(runner, &path, &[], false)
}
