//! Shared test helpers.
//!
//! [`ScriptedRunner`] is a canned [`CommandRunner`] so preflight and restore
//! logic can be exercised without macOS binaries: tests declare the exact
//! command lines they expect and the outputs to return, and can then assert
//! on the order in which commands were issued.

use crate::probe::{CommandRunner, ProbeError, ProbeOutput, ProbeSpec};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

enum Response {
    Output { exit_code: i32, stdout: String, stderr: String },
    Timeout,
}

/// A scripted command runner keyed by rendered command line.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful (exit 0) response.
    pub fn ok(self, command_line: &str, stdout: &str) -> Self {
        self.respond(command_line, 0, stdout, "")
    }

    /// Script a failing response with the given exit code.
    pub fn fail(self, command_line: &str, exit_code: i32, stderr: &str) -> Self {
        self.respond(command_line, exit_code, "", stderr)
    }

    /// Script an arbitrary response.
    pub fn respond(self, command_line: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.responses.lock().unwrap().insert(
            command_line.to_string(),
            Response::Output {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    /// Script a probe timeout.
    pub fn timeout(self, command_line: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(command_line.to_string(), Response::Timeout);
        self
    }

    /// Every command line issued, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &ProbeSpec) -> Result<ProbeOutput, ProbeError> {
        let line = spec.render();
        self.calls.lock().unwrap().push(line.clone());

        let responses = self.responses.lock().unwrap();
        match responses.get(&line) {
            Some(Response::Output { exit_code, stdout, stderr }) => Ok(ProbeOutput {
                command: spec.command.clone(),
                args: spec.args.clone(),
                stdout: stdout.clone().into_bytes(),
                stderr: stderr.clone().into_bytes(),
                exit_code: Some(*exit_code),
                truncated: false,
                duration: Duration::from_millis(1),
            }),
            Some(Response::Timeout) => Err(ProbeError::Timeout(Duration::from_secs(30))),
            None => Err(ProbeError::CommandNotFound(spec.command.clone())),
        }
    }
}
