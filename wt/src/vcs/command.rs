//! Bounded external command execution

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::error::CommandError;

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr together, for matching tool messages
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Label used in errors and logs: program plus its first argument
fn label(program: &str, args: &[&str]) -> String {
    match args.first() {
        Some(sub) => format!("{} {}", program, sub),
        None => program.to_string(),
    }
}

/// Run a command to completion, whatever its exit status
pub async fn run(program: &str, args: &[&str], cwd: Option<&Path>, timeout: Duration) -> Result<CommandOutput, CommandError> {
    let label = label(program, args);
    debug!(%label, ?args, ?cwd, ?timeout, "command::run: called");

    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => {
            debug!(status = ?output.status, "command::run: command completed");
            output
        }
        Ok(Err(source)) => {
            debug!(%source, "command::run: failed to execute command");
            return Err(CommandError::Spawn { program: label, source });
        }
        Err(_) => {
            debug!("command::run: command timed out");
            return Err(CommandError::Timeout { program: label, timeout });
        }
    };

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Run a command and treat a non-zero exit as an error
pub async fn run_checked(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let output = run(program, args, cwd, timeout).await?;
    if output.success() {
        return Ok(output);
    }
    debug!(code = ?output.code, "command::run_checked: command failed");
    Err(CommandError::Failed {
        program: label(program, args),
        code: output.code.unwrap_or(-1),
        stderr: output.stderr.trim().to_string(),
    })
}
