// src/core/scanner/process.rs

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error};

use crate::core::models::{ErrorCategory, ToolError};

/// Everything an external scanner communicates back: exit code, stdout, stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn exit_code_label(&self) -> String {
        match self.exit_code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

/// Runs `command` (program plus leading args) followed by `args`.
///
/// The child is killed if the returned future is dropped, which is how the
/// execution facility's time limit reaches a running scanner.
pub async fn run_process(
    command: &[String],
    args: &[String],
    envs: &[(String, String)],
) -> Result<ProcessOutput, ToolError> {
    let Some((program, leading_args)) = command.split_first() else {
        return Err(ToolError::new(ErrorCategory::ProcessFailed, "No scanner command configured."));
    };

    let mut cmd = Command::new(program);
    cmd.args(leading_args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let env_names: Vec<&str> = envs.iter().map(|(key, _)| key.as_str()).collect();
    debug!(program = %program, ?args, env = ?env_names, "Spawning scanner process.");

    let output = cmd.output().await.map_err(|e| {
        error!(program = %program, error = %e, "Failed to spawn scanner process.");
        ToolError::new(ErrorCategory::ProcessFailed, format!("Failed to run {}: {}", program, e))
    })?;

    let result = ProcessOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(
        exit_code = %result.exit_code_label(),
        stdout_bytes = result.stdout.len(),
        stderr_bytes = result.stderr.len(),
        "Scanner process exited."
    );
    Ok(result)
}
