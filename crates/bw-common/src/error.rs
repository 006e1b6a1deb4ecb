//! Error types for Bulwark.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! Errors can be formatted for human consumption with headline, reason, and fix:
//! ```text
//! ✗ Rollback Point Not Found
//!   Reason: rollback point not found: firewall_20260805_101500_9f2c
//!   Fix: List known points with 'bw-core rollback list'.
//! ```
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 41,
//!   "category": "rollback",
//!   "message": "rollback point not found: firewall_20260805_101500_9f2c",
//!   "recoverable": false,
//!   "kind": "not_found"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Bulwark operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors (schema, parse, resolution).
    Config,
    /// Environment probe errors (tool checks, version queries).
    Preflight,
    /// Gate evaluation errors.
    Gate,
    /// Rollback journal errors (capture, store, restore).
    Rollback,
    /// Hardening script execution errors.
    Script,
    /// File I/O and serialization errors.
    Io,
    /// Platform compatibility errors.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Preflight => write!(f, "preflight"),
            ErrorCategory::Gate => write!(f, "gate"),
            ErrorCategory::Rollback => write!(f, "rollback"),
            ErrorCategory::Script => write!(f, "script"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Failure kind for branching on capture/restore outcomes.
///
/// Callers branch on this instead of parsing log strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// File read/write failed.
    Io,
    /// A subprocess probe exceeded its timeout.
    ProbeTimeout,
    /// The referenced object (point, backup file, key) does not exist.
    NotFound,
    /// The operation requires privileges the caller does not hold.
    PermissionDenied,
    /// A persisted record carried an unrecognized backup kind.
    UnknownKind,
    /// Anything else (parse failures, spawn failures).
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::ProbeTimeout => write!(f, "probe_timeout"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::PermissionDenied => write!(f, "permission_denied"),
            ErrorKind::UnknownKind => write!(f, "unknown_kind"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Unified error type for Bulwark.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("configuration schema validation failed: {0}")]
    SchemaValidation(String),

    // Preflight errors (20-29)
    #[error("environment probe failed: {0}")]
    ProbeFailed(String),

    #[error("probe timed out after {seconds}s")]
    ProbeTimeout { seconds: u64 },

    #[error("required tool missing: {tool}")]
    ToolMissing { tool: String },

    // Gate errors (30-39)
    #[error("preflight gate blocked: {failed_required} required check(s) failed")]
    GateBlocked { failed_required: usize },

    // Rollback errors (40-49)
    #[error("backup store unavailable: {0}")]
    BackupStoreUnavailable(String),

    #[error("rollback point not found: {rollback_id}")]
    RollbackPointNotFound { rollback_id: String },

    #[error("state capture failed: {0}")]
    CaptureFailed(String),

    #[error("restore completed with {failed} error(s)")]
    RestoreIncomplete { failed: usize },

    // Script errors (50-59)
    #[error("hardening script failed: {script} exited {code}")]
    ScriptFailed { script: String, code: i32 },

    #[error("hardening script not found: {0}")]
    ScriptMissing(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (70-79)
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Preflight errors
    /// - 30-39: Gate errors
    /// - 40-49: Rollback errors
    /// - 50-59: Script errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::SchemaValidation(_) => 12,
            Error::ProbeFailed(_) => 20,
            Error::ProbeTimeout { .. } => 21,
            Error::ToolMissing { .. } => 22,
            Error::GateBlocked { .. } => 30,
            Error::BackupStoreUnavailable(_) => 40,
            Error::RollbackPointNotFound { .. } => 41,
            Error::CaptureFailed(_) => 42,
            Error::RestoreIncomplete { .. } => 43,
            Error::ScriptFailed { .. } => 50,
            Error::ScriptMissing(_) => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::UnsupportedPlatform(_) => 70,
            Error::PermissionDenied(_) => 71,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) | Error::SchemaValidation(_) => {
                ErrorCategory::Config
            }

            Error::ProbeFailed(_) | Error::ProbeTimeout { .. } | Error::ToolMissing { .. } => {
                ErrorCategory::Preflight
            }

            Error::GateBlocked { .. } => ErrorCategory::Gate,

            Error::BackupStoreUnavailable(_)
            | Error::RollbackPointNotFound { .. }
            | Error::CaptureFailed(_)
            | Error::RestoreIncomplete { .. } => ErrorCategory::Rollback,

            Error::ScriptFailed { .. } | Error::ScriptMissing(_) => ErrorCategory::Script,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,

            Error::UnsupportedPlatform(_) | Error::PermissionDenied(_) => ErrorCategory::Platform,
        }
    }

    /// Returns the failure kind for programmatic branching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProbeTimeout { .. } => ErrorKind::ProbeTimeout,
            Error::RollbackPointNotFound { .. } | Error::ScriptMissing(_) => ErrorKind::NotFound,
            Error::ToolMissing { .. } => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::Io(_) | Error::BackupStoreUnavailable(_) => ErrorKind::Io,
            _ => ErrorKind::Other,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Config errors: recoverable by fixing the file
            Error::Config(_) => true,
            Error::InvalidConfig(_) => true,
            Error::SchemaValidation(_) => true,

            // Preflight: mostly transient or fixable by installing tools
            Error::ProbeFailed(_) => true,
            Error::ProbeTimeout { .. } => true,
            Error::ToolMissing { .. } => true,

            // Gate blocks are intentional; fix the environment, not the tool
            Error::GateBlocked { .. } => true,

            // Rollback
            Error::BackupStoreUnavailable(_) => true,
            Error::RollbackPointNotFound { .. } => false, // Point is gone
            Error::CaptureFailed(_) => true,
            Error::RestoreIncomplete { .. } => true, // Re-run restore; it is idempotent

            // Script
            Error::ScriptFailed { .. } => true,
            Error::ScriptMissing(_) => true,

            // I/O: often transient
            Error::Io(_) => true,
            Error::Json(_) => true,

            // Platform: not recoverable at runtime
            Error::UnsupportedPlatform(_) => false,
            Error::PermissionDenied(_) => true, // Can elevate
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'bw-core doctor' to validate configuration, or check syntax in config.yaml."
            }
            Error::InvalidConfig(_) => {
                "Fix the reported keys in config.yaml; unknown keys are rejected."
            }
            Error::SchemaValidation(_) => {
                "Ensure config.yaml matches the documented schema (preflight, dependencies, rollback, scripts)."
            }

            Error::ProbeFailed(_) => {
                "Retry the check. If persistent, run the probed command manually to inspect its output."
            }
            Error::ProbeTimeout { .. } => {
                "The probed command hung. Check system load or raise the probe timeout."
            }
            Error::ToolMissing { .. } => {
                "Install the missing tool (e.g. via Homebrew) or remove it from dependencies.required."
            }

            Error::GateBlocked { .. } => {
                "Review the preflight report above and fix the failed required checks before retrying."
            }

            Error::BackupStoreUnavailable(_) => {
                "Check that rollback.backup_location is writable, or point it at another directory."
            }
            Error::RollbackPointNotFound { .. } => {
                "List known points with 'bw-core rollback list'."
            }
            Error::CaptureFailed(_) => {
                "The hardening change proceeded without an undo record. Check probe output and disk space."
            }
            Error::RestoreIncomplete { .. } => {
                "Re-run the restore; already-restored entries are idempotent. Failed entries are listed above."
            }

            Error::ScriptFailed { .. } => {
                "Inspect the script's stderr above. Re-run with --dry-run to preview its actions."
            }
            Error::ScriptMissing(_) => {
                "Check scripts.dir in config.yaml and that the script file is present and executable."
            }

            Error::Io(_) => {
                "Check disk space, permissions, and that the backup root exists. Retry the operation."
            }
            Error::Json(_) => {
                "Invalid JSON in a metadata or backup file. Inspect it with 'jq .' or remove the corrupt point."
            }

            Error::UnsupportedPlatform(_) => {
                "Hardening scripts require macOS. Baseline generation works on any POSIX host."
            }
            Error::PermissionDenied(_) => {
                "Run with elevated privileges: 'sudo bw-core ...' or configure non-interactive sudo."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig(_) => "Invalid Configuration",
            Error::SchemaValidation(_) => "Schema Validation Failed",

            Error::ProbeFailed(_) => "Environment Probe Failed",
            Error::ProbeTimeout { .. } => "Probe Timeout",
            Error::ToolMissing { .. } => "Missing Tool",

            Error::GateBlocked { .. } => "Preflight Gate Blocked",

            Error::BackupStoreUnavailable(_) => "Backup Store Unavailable",
            Error::RollbackPointNotFound { .. } => "Rollback Point Not Found",
            Error::CaptureFailed(_) => "State Capture Failed",
            Error::RestoreIncomplete { .. } => "Restore Incomplete",

            Error::ScriptFailed { .. } => "Hardening Script Failed",
            Error::ScriptMissing(_) => "Hardening Script Missing",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",

            Error::UnsupportedPlatform(_) => "Unsupported Platform",
            Error::PermissionDenied(_) => "Permission Denied",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Failure kind for branching.
    pub kind: ErrorKind,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., rollback_id, script path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::RollbackPointNotFound { rollback_id } => {
                context.insert("rollback_id".to_string(), serde_json::json!(rollback_id));
            }
            Error::ToolMissing { tool } => {
                context.insert("tool".to_string(), serde_json::json!(tool));
            }
            Error::GateBlocked { failed_required } => {
                context.insert(
                    "failed_required".to_string(),
                    serde_json::json!(failed_required),
                );
            }
            Error::RestoreIncomplete { failed } => {
                context.insert("failed_entries".to_string(), serde_json::json!(failed));
            }
            Error::ScriptFailed { script, code } => {
                context.insert("script".to_string(), serde_json::json!(script));
                context.insert("exit_code".to_string(), serde_json::json!(code));
            }
            Error::ProbeTimeout { seconds } => {
                context.insert("timeout_seconds".to_string(), serde_json::json!(seconds));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
