//! Bounded subprocess probes.
//!
//! Every external command the orchestrator runs (tool availability checks,
//! `defaults` reads and writes, `launchctl` queries, `sw_vers`, the sudo
//! probe) goes through this module so that:
//!
//! - each probe has a hard timeout with SIGTERM → SIGKILL escalation
//! - output is capped to prevent memory exhaustion
//! - commands with shell metacharacters are rejected (arguments are passed
//!   as vectors, never through a shell)
//!
//! The [`CommandRunner`] trait is the seam that lets preflight and restore
//! logic run against a scripted fake in tests instead of spawning real
//! macOS binaries.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default timeout per probe in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum captured output size in bytes (1MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

/// Errors that can occur during probe execution.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output from a probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutput {
    /// Command that was executed.
    pub command: String,

    /// Arguments passed to the command.
    pub args: Vec<String>,

    /// Standard output (may be truncated).
    pub stdout: Vec<u8>,

    /// Standard error (may be truncated).
    pub stderr: Vec<u8>,

    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Whether output was truncated at the cap.
    pub truncated: bool,

    /// Execution duration.
    pub duration: Duration,
}

impl ProbeOutput {
    /// Get stdout as string (lossy UTF-8 conversion), trimmed.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// Get stderr as string (lossy UTF-8 conversion), trimmed.
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Combined stdout+stderr text, the way diagnostic signatures are matched.
    pub fn combined_str(&self) -> String {
        let mut text = self.stdout_str();
        let err = self.stderr_str();
        if !err.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&err);
        }
        text
    }

    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Specification for a probe to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    /// Command to execute.
    pub command: String,

    /// Arguments to pass.
    pub args: Vec<String>,

    /// Override timeout (None = use default).
    pub timeout: Option<Duration>,

    /// Override max output (None = use default).
    pub max_output: Option<usize>,
}

impl ProbeSpec {
    /// Create a new probe specification.
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout: None,
            max_output: None,
        }
    }

    /// Set custom timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set custom max output.
    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = Some(max_output);
        self
    }

    /// One-line rendering for logs and dry-run output.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// The seam between orchestration logic and real subprocesses.
///
/// Production code uses [`Prober`]; tests substitute a scripted fake so
/// restore and preflight logic are exercised without spawning a shell.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &ProbeSpec) -> Result<ProbeOutput, ProbeError>;
}

/// Configuration for the prober.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Default timeout per probe.
    pub default_timeout: Duration,

    /// Maximum captured output per stream in bytes.
    pub max_output_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Real subprocess prober.
#[derive(Debug, Default)]
pub struct Prober {
    config: ProbeConfig,
}

impl Prober {
    /// Create a prober with the given configuration.
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Create a prober with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ProbeConfig::default())
    }

    /// Convenience wrapper around [`CommandRunner::run`].
    pub fn probe(&self, command: &str, args: &[&str]) -> Result<ProbeOutput, ProbeError> {
        self.run(&ProbeSpec::new(command, args))
    }

    /// Reject commands that smell like shell injection attempts.
    ///
    /// Arguments are passed as a vector so metacharacters in *arguments*
    /// are inert; only the command itself is constrained.
    fn validate_command(cmd: &str) -> Result<(), ProbeError> {
        if cmd.is_empty() {
            return Err(ProbeError::InvalidCommand("empty command".to_string()));
        }
        if cmd.contains(['|', '&', ';', '$', '`', '\n', '\r', ' ']) {
            return Err(ProbeError::InvalidCommand(format!(
                "command contains shell metacharacters: {}",
                cmd
            )));
        }
        if cmd.starts_with('/') && !std::path::Path::new(cmd).exists() {
            return Err(ProbeError::CommandNotFound(cmd.to_string()));
        }
        Ok(())
    }

    fn execute(
        &self,
        child: &mut Child,
        timeout: Duration,
        max_output: usize,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<i32>, bool, bool), ProbeError> {
        let deadline = Instant::now() + timeout;

        // Reader threads keep the pipes drained so the child never blocks
        // on a full pipe buffer while we wait on it.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out_handle = thread::spawn(move || read_capped(stdout, max_output));
        let err_handle = thread::spawn(move || read_capped(stderr, max_output));

        let mut timed_out = false;
        let exit_code = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status.code(),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        warn!("probe timed out, escalating SIGTERM -> SIGKILL");
                        kill_with_grace(child);
                        break child.wait().ok().and_then(|s| s.code());
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(ProbeError::Io(e)),
            }
        };

        let (stdout_buf, out_truncated) = out_handle.join().unwrap_or_default();
        let (stderr_buf, err_truncated) = err_handle.join().unwrap_or_default();

        Ok((
            stdout_buf,
            stderr_buf,
            exit_code,
            out_truncated || err_truncated,
            timed_out,
        ))
    }
}

impl CommandRunner for Prober {
    fn run(&self, spec: &ProbeSpec) -> Result<ProbeOutput, ProbeError> {
        Self::validate_command(&spec.command)?;

        let timeout = spec.timeout.unwrap_or(self.config.default_timeout);
        let max_output = spec.max_output.unwrap_or(self.config.max_output_bytes);

        debug!(
            command = %spec.command,
            args = ?spec.args,
            timeout_ms = timeout.as_millis() as u64,
            "running probe"
        );

        let start = Instant::now();

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("LC_ALL", "C")
            .env("LANG", "C");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::CommandNotFound(spec.command.clone()));
            }
            Err(e) => return Err(ProbeError::SpawnFailed(e.to_string())),
        };

        let (stdout, stderr, exit_code, truncated, timed_out) =
            self.execute(&mut child, timeout, max_output)?;

        let duration = start.elapsed();
        trace!(
            command = %spec.command,
            exit_code = ?exit_code,
            duration_ms = duration.as_millis() as u64,
            "probe complete"
        );

        if timed_out {
            return Err(ProbeError::Timeout(timeout));
        }

        Ok(ProbeOutput {
            command: spec.command.clone(),
            args: spec.args.clone(),
            stdout,
            stderr,
            exit_code,
            truncated,
            duration,
        })
    }
}

/// Read a stream to a capped buffer; returns (data, truncated).
fn read_capped<R: Read>(stream: Option<R>, max: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::with_capacity(max.min(65536));
    let mut truncated = false;
    let Some(mut stream) = stream else {
        return (buf, truncated);
    };

    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let space = max.saturating_sub(buf.len());
                if space == 0 {
                    // Keep draining so the child is never blocked on write.
                    truncated = true;
                    continue;
                }
                let take = n.min(space);
                buf.extend_from_slice(&chunk[..take]);
                if n > take {
                    truncated = true;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    (buf, truncated)
}

/// SIGTERM, brief grace, then SIGKILL.
fn kill_with_grace(child: &mut Child) {
    #[cfg(unix)]
    {
        let pid = child.id() as libc::pid_t;
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        let grace_deadline = Instant::now() + Duration::from_millis(SIGTERM_GRACE_MS);
        while Instant::now() < grace_deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
    let _ = child.kill();
}
