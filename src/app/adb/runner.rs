use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::app::error::AppError;
use crate::app::models::CommandOutput;

/// Runs a program to completion. No deadline is imposed here; a hung device
/// command keeps the caller waiting.
pub async fn run_command(
    program: &str,
    args: &[String],
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "running command");
    // `output()` drains stdout and stderr concurrently, so a chatty child cannot
    // stall on a full pipe.
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| AppError::dependency(format!("Failed to spawn {program}: {err}"), trace_id))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        entries: Vec::new(),
    })
}

/// Spawns a long-running program whose stdout is written straight into `sink`.
pub fn spawn_into_file(
    program: &str,
    args: &[String],
    sink: std::fs::File,
    trace_id: &str,
) -> Result<Child, AppError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "spawning streaming command");
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(sink))
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AppError::dependency(format!("Failed to spawn {program}: {err}"), trace_id))
}
