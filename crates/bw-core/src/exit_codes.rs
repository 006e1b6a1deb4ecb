//! Exit codes for the bw-core CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.
//!
//! - 0: clean run
//! - 1: operational failure: the preflight gate blocked the command, a
//!   hardening script failed, or a restore finished with failed entries
//! - 2: configuration or usage error, kept distinct from operational
//!   failure so scripting callers can tell "the environment blocked it"
//!   from "the invocation itself is broken"

/// Exit codes for bw-core operations.
///
/// These codes are a stable contract for automation. Changes require
/// a major version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success: command completed, gate passed (or was not required)
    Clean = 0,

    /// Operational failure: gate blocked, script failed, or restore
    /// finished with failed entries
    Failed = 1,

    /// Configuration schema/load failure or invalid invocation
    ConfigError = 2,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::Failed => "ERR_FAILED",
            ExitCode::ConfigError => "ERR_CONFIG",
        }
    }

    /// Exit the process with this code.
    pub fn exit(self) -> ! {
        std::process::exit(self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
