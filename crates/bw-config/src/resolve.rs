//! Configuration resolution for Bulwark.
//!
//! Implements deterministic config resolution order:
//! 1. Explicit CLI flag (--config)
//! 2. Environment variable (BW_CONFIG)
//! 3. Local files (./config.yaml, ./config/bulwark.yaml)
//! 4. XDG default (~/.config/bulwark/config.yaml)
//! 5. Built-in defaults

use std::env;
use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::policy::HardeningConfig;
use bw_common::error::{Error, Result};

/// Local candidate paths probed relative to the working directory.
pub const LOCAL_CANDIDATES: &[&str] = &["config.yaml", "config/bulwark.yaml"];

/// How a config file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigResolution {
    /// From explicit CLI flag
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From a local candidate path
    LocalFile,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigResolution::CliFlag => write!(f, "cli"),
            ConfigResolution::EnvVar => write!(f, "env"),
            ConfigResolution::LocalFile => write!(f, "local"),
            ConfigResolution::XdgConfig => write!(f, "xdg"),
            ConfigResolution::Default => write!(f, "default"),
        }
    }
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file, or None if using defaults
    pub path: Option<String>,
    /// SHA-256 hash of file contents, or None if defaults
    pub hash: Option<String>,
    /// How this source was resolved
    pub resolution: ConfigResolution,
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Path from the CLI flag, if given.
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a new resolver with an optional CLI override.
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        ConfigResolver { cli_path }
    }

    /// Resolve the config file path.
    ///
    /// An explicitly requested path (CLI or env) that does not exist is an
    /// error to the caller of [`load`](Self::load); probed candidate paths
    /// are skipped silently.
    pub fn resolve_path(&self) -> (Option<PathBuf>, ConfigResolution) {
        // 1. CLI flag
        if let Some(ref path) = self.cli_path {
            return (Some(path.clone()), ConfigResolution::CliFlag);
        }

        // 2. BW_CONFIG env var
        if let Ok(path) = env::var("BW_CONFIG") {
            return (Some(PathBuf::from(path)), ConfigResolution::EnvVar);
        }

        // 3. Local candidates
        for candidate in LOCAL_CANDIDATES {
            let path = PathBuf::from(candidate);
            if path.is_file() {
                return (Some(path), ConfigResolution::LocalFile);
            }
        }

        // 4. XDG config dir
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("bulwark").join("config.yaml");
            if path.is_file() {
                return (Some(path), ConfigResolution::XdgConfig);
            }
        }

        // 5. Defaults
        (None, ConfigResolution::Default)
    }

    /// Load and validate configuration from the resolved path or defaults.
    pub fn load(&self) -> Result<(HardeningConfig, ConfigSource)> {
        let (path, resolution) = self.resolve_path();

        match path {
            Some(p) => {
                let content = fs::read_to_string(&p).map_err(|e| {
                    Error::Config(format!("failed to read config from {}: {}", p.display(), e))
                })?;

                let hash = compute_sha256(&content);

                let config: HardeningConfig = serde_yaml::from_str(&content).map_err(|e| {
                    Error::InvalidConfig(format!("failed to parse {}: {}", p.display(), e))
                })?;

                config.validate()?;

                Ok((
                    config,
                    ConfigSource {
                        path: Some(p.to_string_lossy().to_string()),
                        hash: Some(hash),
                        resolution,
                    },
                ))
            }
            None => {
                let config = HardeningConfig::default();
                Ok((
                    config,
                    ConfigSource {
                        path: None,
                        hash: None,
                        resolution: ConfigResolution::Default,
                    },
                ))
            }
        }
    }
}

/// Compute SHA-256 hash of a string.
fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}
