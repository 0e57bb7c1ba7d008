//! External tool invocation with captured output.
//!
//! Every subprocess run yields a [`StepOutput`]; the policy methods on it
//! decide success or failure per call site instead of ad hoc exit-code or
//! stderr checks scattered through the pipeline.

use std::path::Path;
use std::process::ExitStatus;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, TfmError};

/// Captured result of one external tool invocation.
#[derive(Debug)]
pub struct StepOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl StepOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Policy: the step succeeded iff the exit status is zero. On failure the
    /// captured stderr is echoed to the operator's error stream and carried
    /// in the returned error.
    pub fn require_success(self, step: &str) -> Result<StepOutput> {
        if self.status.success() {
            return Ok(self);
        }
        let stderr = self.stderr_text();
        eprint!("{}", stderr);
        Err(TfmError::CommandFailed {
            step: step.to_string(),
            stderr,
        })
    }

    /// Policy: the step succeeded iff stdout parses as `T`.
    ///
    /// `terraform validate -json` exits non-zero whenever diagnostics exist
    /// and writes progress chatter to stderr, so neither is a failure signal
    /// for that step; an unparseable report is.
    pub fn parse_json<T: serde::de::DeserializeOwned>(self, step: &str) -> Result<T> {
        match serde_json::from_slice(&self.stdout) {
            Ok(value) => Ok(value),
            Err(e) => {
                let stderr = self.stderr_text();
                eprint!("{}", stderr);
                Err(TfmError::CommandFailed {
                    step: step.to_string(),
                    stderr: format!("unparseable output ({}): {}", e, stderr),
                })
            }
        }
    }
}

/// Run `program` with `args` in `cwd`, capturing stdout and stderr. The call
/// blocks until the tool exits; failure to spawn is reported as a failure of
/// the named step.
pub async fn run_step(step: &str, program: &str, args: &[String], cwd: &Path) -> Result<StepOutput> {
    debug!(step, program, ?args, cwd = %cwd.display(), "running external tool");

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| TfmError::CommandFailed {
            step: step.to_string(),
            stderr: format!("failed to execute {}: {}", program, e),
        })?;

    Ok(StepOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
