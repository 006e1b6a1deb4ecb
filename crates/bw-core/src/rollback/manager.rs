//! Rollback point lifecycle.
//!
//! `create` -> `(backup_*)*` -> optional `restore` / `cleanup`.
//!
//! Capture ordering contract: callers must capture a setting strictly
//! before mutating it. The manager preserves insertion order and restores
//! in reverse, so the most recently mutated setting is restored first;
//! this matters when later mutations depend on earlier ones (e.g. a
//! service reload after a defaults write).
//!
//! Failure policy:
//! - only "cannot create the backup directory" propagates from point
//!   creation; metadata-write failures degrade to the disabled sentinel id
//!   so a hardening run is never blocked by rollback bookkeeping;
//! - capture routines return typed errors that callers log and ignore;
//! - restore never aborts early: every entry is attempted and failures are
//!   aggregated into the report.

use super::entry::BackupEntry;
use super::store::{BackupRef, BackupStore, RollbackError, RollbackPoint, SystemInfo};
use crate::probe::{CommandRunner, ProbeError, ProbeSpec};
use bw_common::RollbackId;
use bw_config::RollbackSettings;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// Timeout for capture/restore probes.
const SETTING_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one capture call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Entry written and referenced from the point's metadata.
    Recorded,
    /// Rollback recording is disabled; nothing was captured.
    SkippedDisabled,
}

impl CaptureOutcome {
    pub fn recorded(self) -> bool {
        matches!(self, CaptureOutcome::Recorded)
    }
}

/// One failed entry in a restore pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreFailure {
    /// Identifying key of the setting that failed.
    pub key: String,
    /// What went wrong.
    pub reason: String,
}

/// Aggregated outcome of a restore pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub rollback_id: String,
    pub dry_run: bool,
    /// Total entries attempted (always every entry in the point).
    pub attempted: usize,
    /// Settings restored (or, in dry-run, that would be restored).
    pub restored: Vec<String>,
    /// Settings skipped as documented manual steps.
    pub skipped_manual: Vec<String>,
    /// Settings that failed to restore.
    pub failed: Vec<RestoreFailure>,
}

impl RestoreReport {
    fn new(rollback_id: &RollbackId, dry_run: bool) -> Self {
        Self {
            rollback_id: rollback_id.to_string(),
            dry_run,
            attempted: 0,
            restored: Vec::new(),
            skipped_manual: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// True when zero entries errored.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Human-readable report, listing what succeeded and what failed.
    pub fn format_text(&self) -> String {
        let mut lines = vec![format!(
            "{} rollback point {}: {} of {} entr{} restored",
            if self.dry_run { "Dry-run of" } else { "Restored" },
            self.rollback_id,
            self.restored.len(),
            self.attempted,
            if self.attempted == 1 { "y" } else { "ies" },
        )];
        for key in &self.restored {
            lines.push(format!("  [ok]      {}", key));
        }
        for key in &self.skipped_manual {
            lines.push(format!("  [manual]  {} (restoration not automated)", key));
        }
        for failure in &self.failed {
            lines.push(format!("  [failed]  {}: {}", failure.key, failure.reason));
        }
        lines.join("\n")
    }
}

/// Manages the create/append/restore/list/cleanup lifecycle.
pub struct RollbackManager<'a> {
    store: BackupStore,
    runner: &'a dyn CommandRunner,
    enabled: bool,
}

impl<'a> RollbackManager<'a> {
    pub fn new(settings: &RollbackSettings, runner: &'a dyn CommandRunner) -> Self {
        Self {
            store: BackupStore::new(settings.backup_location.clone()),
            runner,
            enabled: settings.enabled,
        }
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Create a rollback point for a component.
    ///
    /// Returns the disabled sentinel when recording is off or when
    /// metadata persistence fails; propagates only backup-directory
    /// creation errors.
    pub fn create_rollback_point(
        &self,
        component: &str,
        description: &str,
    ) -> Result<RollbackId, RollbackError> {
        if !self.enabled {
            info!(component, "rollback disabled, skipping rollback point creation");
            return Ok(RollbackId::disabled());
        }

        self.store.ensure_root()?;

        let now = Utc::now();
        let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
        // Random suffix keeps two same-second operations for one component
        // from landing in the same directory.
        let suffix = format!("{:04x}", rand::rng().random_range(0u32..=0xffff));
        let id = RollbackId::new(component, &timestamp, &suffix);

        let point = RollbackPoint {
            rollback_id: id.to_string(),
            component: component.to_string(),
            description: description.to_string(),
            timestamp,
            created_at: now.to_rfc3339(),
            system_info: self.detect_system_info(),
            backups: Vec::new(),
        };

        match self.store.init_point(&id, &point) {
            Ok(()) => {
                info!(rollback_id = %id, component, "created rollback point");
                Ok(id)
            }
            Err(RollbackError::StoreUnavailable { path, source }) => {
                Err(RollbackError::StoreUnavailable { path, source })
            }
            Err(e) => {
                error!(component, error = %e, "failed to persist rollback metadata; continuing without undo record");
                Ok(RollbackId::disabled())
            }
        }
    }

    /// Capture a `defaults` domain/key value.
    ///
    /// Must be called strictly before the corresponding `defaults write`.
    pub fn backup_defaults_setting(
        &self,
        rollback_id: &RollbackId,
        domain: &str,
        key: &str,
        use_sudo: bool,
    ) -> Result<CaptureOutcome, RollbackError> {
        if rollback_id.is_disabled() {
            return Ok(CaptureOutcome::SkippedDisabled);
        }

        let spec = if use_sudo {
            ProbeSpec::new("sudo", &["defaults", "read", domain, key])
        } else {
            ProbeSpec::new("defaults", &["read", domain, key])
        }
        .with_timeout(SETTING_PROBE_TIMEOUT);

        // A non-zero exit means the key does not exist; that is a valid
        // capture, not a failure.
        let output = self.runner.run(&spec).map_err(map_probe_error)?;
        let exists = output.success();

        let entry = BackupEntry::Defaults {
            domain: domain.to_string(),
            key: key.to_string(),
            use_sudo,
            original_value: exists.then(|| output.stdout_str()),
            exists,
            backup_time: Utc::now().to_rfc3339(),
        };

        self.append_entry(rollback_id, entry)
    }

    /// Capture a named system setting as raw probe output.
    ///
    /// Restore for these is a documented manual step; the capture still
    /// records what the setting looked like before mutation.
    pub fn backup_system_setting(
        &self,
        rollback_id: &RollbackId,
        setting_name: &str,
        check_command: &ProbeSpec,
    ) -> Result<CaptureOutcome, RollbackError> {
        if rollback_id.is_disabled() {
            return Ok(CaptureOutcome::SkippedDisabled);
        }

        let spec = check_command
            .clone()
            .with_timeout(SETTING_PROBE_TIMEOUT);
        let output = self.runner.run(&spec).map_err(map_probe_error)?;

        let entry = BackupEntry::System {
            setting_name: setting_name.to_string(),
            check_command: check_command.render(),
            original_value: output.success().then(|| output.stdout_str()),
            return_code: output.exit_code.unwrap_or(-1),
            backup_time: Utc::now().to_rfc3339(),
        };

        self.append_entry(rollback_id, entry)
    }

    /// Capture whether a launchd service is currently loaded.
    pub fn backup_service_state(
        &self,
        rollback_id: &RollbackId,
        service_name: &str,
    ) -> Result<CaptureOutcome, RollbackError> {
        if rollback_id.is_disabled() {
            return Ok(CaptureOutcome::SkippedDisabled);
        }

        let spec = ProbeSpec::new("sudo", &["launchctl", "list"])
            .with_timeout(SETTING_PROBE_TIMEOUT);
        let output = self.runner.run(&spec).map_err(map_probe_error)?;

        let service_line = output
            .stdout_str()
            .lines()
            .find(|line| line.contains(service_name))
            .map(|line| line.trim().to_string());

        let entry = BackupEntry::Service {
            service_name: service_name.to_string(),
            was_loaded: service_line.is_some(),
            service_info: service_line,
            backup_time: Utc::now().to_rfc3339(),
        };

        self.append_entry(rollback_id, entry)
    }

    /// Replay a point's entries in reverse capture order.
    ///
    /// `dry_run` exercises the same iteration and dispatch but mutates
    /// nothing. No early abort: a mid-incident operator gets as much
    /// restored as possible.
    pub fn restore(
        &self,
        rollback_id: &RollbackId,
        dry_run: bool,
    ) -> Result<RestoreReport, RollbackError> {
        let point = self.store.load_point(rollback_id)?;
        info!(
            rollback_id = %rollback_id,
            description = %point.description,
            entries = point.backups.len(),
            dry_run,
            "rolling back"
        );

        let mut report = RestoreReport::new(rollback_id, dry_run);
        report.attempted = point.backups.len();

        for backup_ref in point.backups.iter().rev() {
            let key = backup_ref.identifying_key();

            let entry = match self.store.load_entry(&backup_ref.file) {
                Ok(entry) => entry,
                Err(e) => {
                    error!(key = %key, error = %e, "backup file unreadable");
                    report.failed.push(RestoreFailure {
                        key,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let recipe = entry.restore_recipe();

            if dry_run {
                info!(key = %key, "DRY RUN: would {}", recipe.describe());
                if recipe.is_manual() {
                    report.skipped_manual.push(key);
                } else {
                    report.restored.push(key);
                }
                continue;
            }

            if recipe.is_manual() {
                warn!(key = %key, "system setting restoration not automated; manual step required");
                report.skipped_manual.push(key);
                continue;
            }

            let Some(spec) = recipe.command() else {
                // Service that was never loaded: leaving it unloaded is the
                // restored state.
                info!(key = %key, "{}", recipe.describe());
                report.restored.push(key);
                continue;
            };

            match self.runner.run(&spec.with_timeout(SETTING_PROBE_TIMEOUT)) {
                Ok(output) if output.success() || recipe.failure_is_success() => {
                    info!(key = %key, "{}", recipe.describe());
                    report.restored.push(key);
                }
                Ok(output) => {
                    let reason = format!(
                        "exit {}: {}",
                        output.exit_code.unwrap_or(-1),
                        output.stderr_str()
                    );
                    error!(key = %key, reason = %reason, "restore command failed");
                    report.failed.push(RestoreFailure { key, reason });
                }
                Err(e) => {
                    error!(key = %key, error = %e, "restore command errored");
                    report.failed.push(RestoreFailure {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.success() {
            info!(rollback_id = %rollback_id, "rollback complete");
        } else {
            warn!(
                rollback_id = %rollback_id,
                failed = report.failed.len(),
                "rollback finished with errors"
            );
        }
        Ok(report)
    }

    /// All known points, newest first.
    pub fn list_rollback_points(&self) -> Vec<RollbackPoint> {
        self.store.list_points()
    }

    /// Delete all but the `keep_count` most recent points.
    ///
    /// Returns how many were removed; removing fewer than requested (or
    /// zero, when the store holds at most `keep_count` points) is not an
    /// error.
    pub fn cleanup_old_rollback_points(&self, keep_count: usize) -> usize {
        let points = self.list_rollback_points();
        if points.len() <= keep_count {
            return 0;
        }

        let mut removed = 0;
        for point in &points[keep_count..] {
            let Some(id) = RollbackId::parse(&point.rollback_id) else {
                warn!(rollback_id = %point.rollback_id, "refusing to remove point with unsafe id");
                continue;
            };
            match self.store.remove_point(&id) {
                Ok(()) => {
                    info!(rollback_id = %id, "removed old rollback point");
                    removed += 1;
                }
                Err(e) => {
                    error!(rollback_id = %id, error = %e, "failed to remove rollback point");
                }
            }
        }
        removed
    }

    fn append_entry(
        &self,
        rollback_id: &RollbackId,
        entry: BackupEntry,
    ) -> Result<CaptureOutcome, RollbackError> {
        let file = self.store.write_entry(rollback_id, &entry)?;
        self.store
            .append_ref(rollback_id, BackupRef::for_entry(&entry, file))?;
        info!(rollback_id = %rollback_id, key = %entry.identifying_key(), "captured backup entry");
        Ok(CaptureOutcome::Recorded)
    }

    fn detect_system_info(&self) -> SystemInfo {
        let macos_version = self
            .runner
            .run(&ProbeSpec::new("sw_vers", &["-productVersion"]).with_timeout(Duration::from_secs(5)))
            .ok()
            .filter(|o| o.success())
            .map(|o| o.stdout_str())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        SystemInfo {
            macos_version,
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

fn map_probe_error(e: ProbeError) -> RollbackError {
    match e {
        ProbeError::Timeout(d) => RollbackError::ProbeTimeout(d),
        other => RollbackError::ProbeFailed(other.to_string()),
    }
}
