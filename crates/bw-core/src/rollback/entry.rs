//! Backup entry model.
//!
//! A [`BackupEntry`] is the recorded pre-mutation state of exactly one
//! system setting. Entries are immutable once written: restoring never
//! mutates the entry, only the live system.
//!
//! The serialized field names (including the `type` tag) match the legacy
//! on-disk format, so points recorded by earlier releases remain
//! restorable. Restore behavior is derived from the entry as a tagged
//! [`RestoreRecipe`] instead of being stored as shell command strings.

use crate::probe::ProbeSpec;
use serde::{Deserialize, Serialize};

/// The three capture flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// A `defaults` domain/key value.
    Defaults,
    /// Raw output of a diagnostic command for one named setting.
    System,
    /// A launchd service's loaded state.
    Service,
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupKind::Defaults => write!(f, "defaults"),
            BackupKind::System => write!(f, "system"),
            BackupKind::Service => write!(f, "service"),
        }
    }
}

/// One captured setting, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackupEntry {
    Defaults {
        domain: String,
        key: String,
        #[serde(default)]
        use_sudo: bool,
        /// Value before mutation; None when the key did not exist.
        original_value: Option<String>,
        /// Whether the key existed at capture time.
        exists: bool,
        backup_time: String,
    },
    System {
        setting_name: String,
        /// The read probe that produced `original_value`, rendered for the
        /// record. Informational; restore never executes it.
        check_command: String,
        original_value: Option<String>,
        return_code: i32,
        backup_time: String,
    },
    Service {
        service_name: String,
        was_loaded: bool,
        /// Raw probe line for the service, when it was loaded.
        service_info: Option<String>,
        backup_time: String,
    },
}

impl BackupEntry {
    pub fn kind(&self) -> BackupKind {
        match self {
            BackupEntry::Defaults { .. } => BackupKind::Defaults,
            BackupEntry::System { .. } => BackupKind::System,
            BackupEntry::Service { .. } => BackupKind::Service,
        }
    }

    /// The key naming this entry within its rollback point.
    pub fn identifying_key(&self) -> String {
        match self {
            BackupEntry::Defaults { domain, key, .. } => format!("{}.{}", domain, key),
            BackupEntry::System { setting_name, .. } => setting_name.clone(),
            BackupEntry::Service { service_name, .. } => service_name.clone(),
        }
    }

    /// Backup file stem: `defaults_<domain>_<key>`, `system_<name>`,
    /// `service_<name>` (the legacy naming).
    pub fn file_stem(&self) -> String {
        match self {
            BackupEntry::Defaults { domain, key, .. } => {
                format!("defaults_{}_{}", domain, key)
            }
            BackupEntry::System { setting_name, .. } => format!("system_{}", setting_name),
            BackupEntry::Service { service_name, .. } => format!("service_{}", service_name),
        }
    }

    /// Derive the undo recipe for this entry.
    pub fn restore_recipe(&self) -> RestoreRecipe {
        match self {
            BackupEntry::Defaults {
                domain,
                key,
                use_sudo,
                original_value,
                exists,
                ..
            } => {
                if *exists {
                    if let Some(value) = original_value {
                        return RestoreRecipe::DefaultsWrite {
                            domain: domain.clone(),
                            key: key.clone(),
                            value: value.clone(),
                            use_sudo: *use_sudo,
                        };
                    }
                }
                RestoreRecipe::DefaultsDelete {
                    domain: domain.clone(),
                    key: key.clone(),
                    use_sudo: *use_sudo,
                }
            }
            BackupEntry::System { setting_name, .. } => RestoreRecipe::ManualStepRequired {
                setting_name: setting_name.clone(),
            },
            BackupEntry::Service {
                service_name,
                was_loaded,
                ..
            } => {
                if *was_loaded {
                    RestoreRecipe::ServiceLoad {
                        service_name: service_name.clone(),
                    }
                } else {
                    RestoreRecipe::ServiceNoop {
                        service_name: service_name.clone(),
                    }
                }
            }
        }
    }
}

/// How one entry is undone. Data, not shell strings: the executor builds
/// argument vectors from these variants, so restore logic is testable
/// without spawning anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreRecipe {
    /// Write the original value back.
    DefaultsWrite {
        domain: String,
        key: String,
        value: String,
        use_sudo: bool,
    },
    /// Delete a key that did not exist before capture.
    DefaultsDelete {
        domain: String,
        key: String,
        use_sudo: bool,
    },
    /// Reload a service that was loaded before capture.
    ServiceLoad { service_name: String },
    /// The service was not loaded before; leave it alone.
    ServiceNoop { service_name: String },
    /// No generic undo exists for this setting; surfaced in the report.
    ManualStepRequired { setting_name: String },
}

impl RestoreRecipe {
    /// The command to execute, or None for no-op/manual recipes.
    pub fn command(&self) -> Option<ProbeSpec> {
        match self {
            RestoreRecipe::DefaultsWrite {
                domain,
                key,
                value,
                use_sudo,
            } => Some(defaults_command(*use_sudo, &["write", domain, key, value])),
            RestoreRecipe::DefaultsDelete {
                domain,
                key,
                use_sudo,
            } => Some(defaults_command(*use_sudo, &["delete", domain, key])),
            RestoreRecipe::ServiceLoad { service_name } => Some(ProbeSpec::new(
                "sudo",
                &[
                    "launchctl",
                    "load",
                    "-w",
                    &format!("/System/Library/LaunchDaemons/{}.plist", service_name),
                ],
            )),
            RestoreRecipe::ServiceNoop { .. } | RestoreRecipe::ManualStepRequired { .. } => None,
        }
    }

    /// Whether a non-zero exit still counts as restored.
    ///
    /// Deleting a key that is already absent is the idempotent success
    /// case: re-running a restore must not report new failures.
    pub fn failure_is_success(&self) -> bool {
        matches!(self, RestoreRecipe::DefaultsDelete { .. })
    }

    /// Whether this recipe is a counted-but-skipped manual step.
    pub fn is_manual(&self) -> bool {
        matches!(self, RestoreRecipe::ManualStepRequired { .. })
    }

    /// One-line rendering for dry-run output and logs.
    pub fn describe(&self) -> String {
        match self {
            RestoreRecipe::DefaultsWrite {
                domain, key, value, ..
            } => format!("restore {}.{} to '{}'", domain, key, value),
            RestoreRecipe::DefaultsDelete { domain, key, .. } => {
                format!("delete {}.{} (did not exist before)", domain, key)
            }
            RestoreRecipe::ServiceLoad { service_name } => {
                format!("load service {}", service_name)
            }
            RestoreRecipe::ServiceNoop { service_name } => {
                format!("leave service {} unloaded (no action)", service_name)
            }
            RestoreRecipe::ManualStepRequired { setting_name } => {
                format!("manual step required for system setting {}", setting_name)
            }
        }
    }
}

fn defaults_command(use_sudo: bool, args: &[&str]) -> ProbeSpec {
    if use_sudo {
        let mut full = vec!["defaults"];
        full.extend_from_slice(args);
        ProbeSpec::new("sudo", &full)
    } else {
        ProbeSpec::new("defaults", args)
    }
}
