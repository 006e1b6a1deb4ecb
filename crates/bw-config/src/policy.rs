//! Configuration sections for the hardening orchestrator.
//!
//! These types correspond to config.yaml and define:
//! - The preflight gate policy (minimum OS version and its enforcement)
//! - Required/optional external tool dependencies
//! - Rollback journal settings (backup root, retention)
//! - Hardening script locations

use bw_common::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for Bulwark.
///
/// Every section has a default, so a missing config file means
/// "defaults everywhere". Unknown keys are a hard load error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HardeningConfig {
    /// Preflight gate policy.
    #[serde(default)]
    pub preflight: GatePolicy,

    /// External tool dependencies probed during preflight.
    #[serde(default)]
    pub dependencies: Dependencies,

    /// Rollback journal settings.
    #[serde(default)]
    pub rollback: RollbackSettings,

    /// Hardening script locations.
    #[serde(default)]
    pub scripts: ScriptSettings,
}

impl HardeningConfig {
    /// Validate configuration semantically.
    pub fn validate(&self) -> Result<()> {
        self.preflight.validate()?;
        self.dependencies.validate()?;
        self.rollback.validate()?;
        self.scripts.validate()?;
        Ok(())
    }
}

/// Minimum-OS-version policy consumed by the gate and the preflight
/// evaluator. Read-only from their perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatePolicy {
    /// Minimum macOS version for mutating operations (e.g. "26.3").
    #[serde(default = "default_min_macos_version")]
    pub min_macos_version: String,

    /// Whether a version below the minimum blocks the gate.
    #[serde(default = "default_true")]
    pub enforce_min_version: bool,
}

fn default_min_macos_version() -> String {
    "26.3".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GatePolicy {
    fn default() -> Self {
        GatePolicy {
            min_macos_version: default_min_macos_version(),
            enforce_min_version: true,
        }
    }
}

impl GatePolicy {
    fn validate(&self) -> Result<()> {
        if self.min_macos_version.is_empty() {
            return Err(Error::SchemaValidation(
                "preflight.min_macos_version must not be empty".into(),
            ));
        }
        // Leading components must be numeric for tuple comparison to work.
        let first = self
            .min_macos_version
            .split('.')
            .next()
            .unwrap_or_default();
        if first.parse::<u32>().is_err() {
            return Err(Error::SchemaValidation(format!(
                "preflight.min_macos_version must start with a number, got '{}'",
                self.min_macos_version
            )));
        }
        Ok(())
    }
}

/// External tool dependency lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependencies {
    /// Tools whose absence fails a required preflight check.
    #[serde(default = "default_required_tools")]
    pub required: Vec<String>,

    /// Tools whose absence only warns.
    #[serde(default = "default_optional_tools")]
    pub optional: Vec<String>,
}

fn default_required_tools() -> Vec<String> {
    vec!["curl".to_string(), "jq".to_string()]
}

fn default_optional_tools() -> Vec<String> {
    vec!["pup".to_string()]
}

impl Default for Dependencies {
    fn default() -> Self {
        Dependencies {
            required: default_required_tools(),
            optional: default_optional_tools(),
        }
    }
}

impl Dependencies {
    fn validate(&self) -> Result<()> {
        for tool in self.required.iter().chain(self.optional.iter()) {
            if tool.is_empty() || tool.contains('/') || tool.contains(char::is_whitespace) {
                return Err(Error::SchemaValidation(format!(
                    "dependencies entries must be bare tool names, got '{}'",
                    tool
                )));
            }
        }
        Ok(())
    }
}

/// Rollback journal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollbackSettings {
    /// Directory holding one subdirectory per rollback point.
    #[serde(default = "default_backup_location")]
    pub backup_location: PathBuf,

    /// Whether rollback points are recorded at all. When false, point
    /// creation returns the disabled sentinel and captures are no-ops.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How many points `rollback cleanup` keeps by default.
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
}

fn default_backup_location() -> PathBuf {
    PathBuf::from("/tmp/bulwark_backup")
}

fn default_keep_count() -> usize {
    10
}

impl Default for RollbackSettings {
    fn default() -> Self {
        RollbackSettings {
            backup_location: default_backup_location(),
            enabled: true,
            keep_count: default_keep_count(),
        }
    }
}

impl RollbackSettings {
    fn validate(&self) -> Result<()> {
        if self.backup_location.as_os_str().is_empty() {
            return Err(Error::SchemaValidation(
                "rollback.backup_location must not be empty".into(),
            ));
        }
        if self.keep_count == 0 {
            return Err(Error::SchemaValidation(
                "rollback.keep_count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Hardening script locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptSettings {
    /// Directory containing the bash hardening scripts.
    #[serde(default = "default_script_dir")]
    pub dir: PathBuf,

    /// External baseline rule engine invoked for generate/tailor/apply.
    #[serde(default = "default_baseline_command")]
    pub baseline: String,
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_baseline_command() -> String {
    "baseline.sh".to_string()
}

impl Default for ScriptSettings {
    fn default() -> Self {
        ScriptSettings {
            dir: default_script_dir(),
            baseline: default_baseline_command(),
        }
    }
}

impl ScriptSettings {
    fn validate(&self) -> Result<()> {
        if self.baseline.is_empty() {
            return Err(Error::SchemaValidation(
                "scripts.baseline must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = HardeningConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.preflight.min_macos_version, "26.3");
        assert!(config.preflight.enforce_min_version);
        assert_eq!(config.dependencies.required, vec!["curl", "jq"]);
        assert_eq!(config.rollback.keep_count, 10);
    }

    #[test]
    fn test_parse_partial_yaml_fills_defaults() {
        let yaml = r#"
preflight:
  min_macos_version: "15.2"
rollback:
  backup_location: /var/tmp/bw
"#;
        let config: HardeningConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.preflight.min_macos_version, "15.2");
        assert!(config.preflight.enforce_min_version); // defaulted
        assert_eq!(config.rollback.backup_location, PathBuf::from("/var/tmp/bw"));
        assert!(config.rollback.enabled);
        assert_eq!(config.dependencies.optional, vec!["pup"]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let yaml = r#"
preflight:
  min_macos_version: "26.3"
  enforce_min_versio: true
"#;
        assert!(serde_yaml::from_str::<HardeningConfig>(yaml).is_err());

        let yaml_top = "fleet:\n  hosts: []\n";
        assert!(serde_yaml::from_str::<HardeningConfig>(yaml_top).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_min_version() {
        let mut config = HardeningConfig::default();
        config.preflight.min_macos_version = "sequoia".into();
        assert!(config.validate().is_err());

        config.preflight.min_macos_version = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_dependency_names() {
        let mut config = HardeningConfig::default();
        config.dependencies.required = vec!["/usr/bin/curl".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_keep_count() {
        let mut config = HardeningConfig::default();
        config.rollback.keep_count = 0;
        assert!(config.validate().is_err());
    }
}
