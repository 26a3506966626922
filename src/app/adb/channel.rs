use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::adb::parse::{detect_shell_failure, parse_ls_output};
use crate::app::adb::paths::{shell_quote_device_path, validate_device_path};
use crate::app::adb::runner::{run_command, spawn_into_file};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::models::{CommandOutput, StreamExit};

/// One discrete command against the connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Shell(String),
    Chmod {
        paths: Vec<String>,
        mode: String,
        recursive: bool,
    },
    RemoveDir(String),
    ListDir(String),
    ForceStop(String),
    LaunchActivity { app_id: String, activity: String },
    Uninstall(String),
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Shell(command) => write!(f, "shell `{command}`"),
            DeviceCommand::Chmod {
                paths,
                mode,
                recursive,
            } => {
                let flag = if *recursive { " -R" } else { "" };
                write!(f, "chmod{flag} {mode} {}", paths.join(" "))
            }
            DeviceCommand::RemoveDir(path) => write!(f, "remove directory {path}"),
            DeviceCommand::ListDir(path) => write!(f, "list directory {path}"),
            DeviceCommand::ForceStop(app_id) => write!(f, "force-stop {app_id}"),
            DeviceCommand::LaunchActivity { app_id, activity } => {
                write!(f, "launch {app_id}/{activity}")
            }
            DeviceCommand::Uninstall(app_id) => write!(f, "uninstall {app_id}"),
        }
    }
}

/// Owned by whoever started the stream. Cancelling asks the channel to stop;
/// `finished` resolves once the underlying command is really gone.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
    finished: oneshot::Receiver<StreamExit>,
}

impl StreamHandle {
    pub fn new(cancel: CancellationToken, finished: oneshot::Receiver<StreamExit>) -> Self {
        Self { cancel, finished }
    }

    pub fn into_parts(self) -> (CancellationToken, oneshot::Receiver<StreamExit>) {
        (self.cancel, self.finished)
    }
}

#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn run(&self, command: &DeviceCommand, trace_id: &str) -> Result<CommandOutput, AppError>;

    /// Starts the continuous device log, written into `sink` until cancelled
    /// or until the device goes away.
    async fn start_stream(
        &self,
        sink: tokio::fs::File,
        trace_id: &str,
    ) -> Result<StreamHandle, AppError>;
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        "adb".to_string()
    } else {
        normalized
    }
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}

fn validate_app_id(app_id: &str) -> Result<(), String> {
    let valid = !app_id.is_empty()
        && app_id.split('.').count() >= 2
        && app_id
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_'));
    if valid {
        Ok(())
    } else {
        Err(format!("Invalid package name: '{app_id}'"))
    }
}

/// `CommandChannel` backed by the adb executable.
#[derive(Debug, Clone)]
pub struct AdbChannel {
    program: String,
    serial: Option<String>,
}

impl AdbChannel {
    pub fn new(program: impl Into<String>, serial: Option<String>) -> Self {
        Self {
            program: program.into(),
            serial,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            resolve_adb_program(&config.adb_command_path),
            config.device_serial.clone(),
        )
    }

    /// Runs an adb subcommand that does not address a device (`devices`,
    /// `kill-server`).
    pub async fn run_host(&self, args: &[&str], trace_id: &str) -> Result<CommandOutput, AppError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let output = run_command(&self.program, &args, trace_id).await?;
        ensure_success(&format!("adb {}", args.join(" ")), output, false, trace_id)
    }

    fn device_args(&self, tail: Vec<String>) -> Vec<String> {
        let mut args = Vec::with_capacity(tail.len() + 2);
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.extend(tail);
        args
    }

    pub fn build_args(&self, command: &DeviceCommand, trace_id: &str) -> Result<Vec<String>, AppError> {
        let check_path = |path: &str| {
            validate_device_path(path).map_err(|message| AppError::validation(message, trace_id))
        };
        let check_app = |app_id: &str| {
            validate_app_id(app_id).map_err(|message| AppError::validation(message, trace_id))
        };

        let tail: Vec<String> = match command {
            DeviceCommand::Shell(line) => {
                if line.trim().is_empty() {
                    return Err(AppError::validation("shell command is required", trace_id));
                }
                vec!["shell".to_string(), line.clone()]
            }
            DeviceCommand::Chmod {
                paths,
                mode,
                recursive,
            } => {
                if paths.is_empty() {
                    return Err(AppError::validation("chmod needs at least one path", trace_id));
                }
                if mode.is_empty()
                    || !mode
                        .chars()
                        .all(|ch| ch.is_ascii_digit() || "ugoa+-=rwxX,".contains(ch))
                {
                    return Err(AppError::validation(format!("Invalid chmod mode: '{mode}'"), trace_id));
                }
                let mut args = vec!["shell".to_string(), "chmod".to_string()];
                if *recursive {
                    args.push("-R".to_string());
                }
                args.push(mode.clone());
                for path in paths {
                    check_path(path)?;
                    args.push(shell_quote_device_path(path));
                }
                args
            }
            DeviceCommand::RemoveDir(path) => {
                check_path(path)?;
                vec![
                    "shell".to_string(),
                    "rm".to_string(),
                    "-rf".to_string(),
                    shell_quote_device_path(path),
                ]
            }
            DeviceCommand::ListDir(path) => {
                check_path(path)?;
                vec![
                    "shell".to_string(),
                    "ls".to_string(),
                    "-1".to_string(),
                    shell_quote_device_path(path),
                ]
            }
            DeviceCommand::ForceStop(app_id) => {
                check_app(app_id)?;
                vec![
                    "shell".to_string(),
                    "am".to_string(),
                    "force-stop".to_string(),
                    app_id.clone(),
                ]
            }
            DeviceCommand::LaunchActivity { app_id, activity } => {
                check_app(app_id)?;
                if activity.trim().is_empty() || activity.contains(char::is_whitespace) {
                    return Err(AppError::validation(format!("Invalid activity: '{activity}'"), trace_id));
                }
                vec![
                    "shell".to_string(),
                    "am".to_string(),
                    "start".to_string(),
                    "-n".to_string(),
                    format!("{app_id}/{activity}"),
                ]
            }
            DeviceCommand::Uninstall(app_id) => {
                check_app(app_id)?;
                vec!["uninstall".to_string(), app_id.clone()]
            }
        };
        Ok(self.device_args(tail))
    }
}

fn ensure_success(
    label: &str,
    output: CommandOutput,
    check_stdout: bool,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    if output.exit_code != Some(0) {
        let exit = output
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let detail = [output.stderr.trim(), output.stdout.trim()]
            .into_iter()
            .find(|text| !text.is_empty())
            .unwrap_or("no output");
        return Err(AppError::dependency(
            format!("{label} failed (exit {exit}): {detail}"),
            trace_id,
        ));
    }
    if check_stdout {
        if let Some(reason) = detect_shell_failure(&output.stdout) {
            return Err(AppError::dependency(format!("{label} failed: {reason}"), trace_id));
        }
    }
    Ok(output)
}

#[async_trait]
impl CommandChannel for AdbChannel {
    async fn run(&self, command: &DeviceCommand, trace_id: &str) -> Result<CommandOutput, AppError> {
        let args = self.build_args(command, trace_id)?;
        let output = run_command(&self.program, &args, trace_id).await?;
        let label = command.to_string();

        match command {
            DeviceCommand::ListDir(path) => {
                let combined = format!("{}{}", output.stdout, output.stderr);
                if output.exit_code != Some(0) && combined.contains("No such file or directory") {
                    debug!(trace_id = %trace_id, path = %path, "listing missing directory as empty");
                    return Ok(CommandOutput {
                        entries: Vec::new(),
                        ..output
                    });
                }
                let mut output = ensure_success(&label, output, false, trace_id)?;
                output.entries = parse_ls_output(path, &output.stdout);
                Ok(output)
            }
            DeviceCommand::LaunchActivity { .. }
            | DeviceCommand::ForceStop(_)
            | DeviceCommand::Uninstall(_) => ensure_success(&label, output, true, trace_id),
            _ => ensure_success(&label, output, false, trace_id),
        }
    }

    async fn start_stream(
        &self,
        sink: tokio::fs::File,
        trace_id: &str,
    ) -> Result<StreamHandle, AppError> {
        let args = self.device_args(vec!["logcat".to_string()]);
        let sink = sink.into_std().await;
        let mut child = spawn_into_file(&self.program, &args, sink, trace_id)?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        let token = cancel.clone();
        let trace_id = trace_id.to_string();

        tokio::spawn(async move {
            let waited = tokio::select! {
                _ = token.cancelled() => None,
                status = child.wait() => Some(status),
            };
            let exit = match waited {
                None => {
                    if let Err(err) = child.kill().await {
                        warn!(trace_id = %trace_id, error = %err, "failed to kill logcat process");
                    }
                    StreamExit::Cancelled
                }
                Some(Ok(status)) => StreamExit::Ended {
                    exit_code: status.code(),
                },
                Some(Err(err)) => StreamExit::Failed(AppError::dependency(
                    format!("Failed to wait for logcat: {err}"),
                    &trace_id,
                )),
            };
            debug!(trace_id = %trace_id, exit = ?exit, "logcat stream finished");
            let _ = done_tx.send(exit);
        });

        Ok(StreamHandle::new(cancel, done_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> AdbChannel {
        AdbChannel::new("adb", Some("SERIAL1".to_string()))
    }

    #[test]
    fn strips_wrapping_quotes_and_defaults_to_adb() {
        assert_eq!(
            normalize_command_path("  \"/opt/platform-tools/adb\"  "),
            "/opt/platform-tools/adb"
        );
        assert_eq!(normalize_command_path("'/opt/adb'"), "/opt/adb");
        assert_eq!(resolve_adb_program("   "), "adb");
    }

    #[test]
    fn validates_nonexistent_adb_path() {
        let err = validate_adb_program("/this/path/should/not/exist/adb").unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
        assert!(validate_adb_program("adb").is_ok());
    }

    #[test]
    fn builds_chmod_with_quoted_wildcards() {
        let args = channel()
            .build_args(
                &DeviceCommand::Chmod {
                    paths: vec!["/sdcard/mods/*".to_string(), "/sdcard/libs/*".to_string()],
                    mode: "+r".to_string(),
                    recursive: true,
                },
                "trace",
            )
            .expect("args");
        assert_eq!(
            args,
            vec!["-s", "SERIAL1", "shell", "chmod", "-R", "+r", "'/sdcard/mods'/*", "'/sdcard/libs'/*"]
        );
    }

    #[test]
    fn builds_launch_and_uninstall() {
        let launch = channel()
            .build_args(
                &DeviceCommand::LaunchActivity {
                    app_id: "com.beatgames.beatsaber".to_string(),
                    activity: "com.unity3d.player.UnityPlayerActivity".to_string(),
                },
                "trace",
            )
            .expect("launch");
        assert_eq!(
            launch[2..],
            ["shell", "am", "start", "-n", "com.beatgames.beatsaber/com.unity3d.player.UnityPlayerActivity"]
        );

        let uninstall = AdbChannel::new("adb", None)
            .build_args(&DeviceCommand::Uninstall("com.beatgames.beatsaber".to_string()), "trace")
            .expect("uninstall");
        assert_eq!(uninstall, vec!["uninstall", "com.beatgames.beatsaber"]);
    }

    #[test]
    fn rejects_unsafe_inputs_before_spawning() {
        let err = channel()
            .build_args(&DeviceCommand::RemoveDir("/".to_string()), "trace-rm")
            .expect_err("root rm must be refused");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert_eq!(err.trace_id, "trace-rm");

        let err = channel()
            .build_args(&DeviceCommand::ForceStop("not a package".to_string()), "trace")
            .expect_err("bad package");
        assert!(err.error.contains("Invalid package name"));

        let err = channel()
            .build_args(
                &DeviceCommand::Chmod {
                    paths: vec!["/sdcard/mods".to_string()],
                    mode: "777; reboot".to_string(),
                    recursive: false,
                },
                "trace",
            )
            .expect_err("bad mode");
        assert!(err.error.contains("Invalid chmod mode"));
    }

    #[test]
    fn non_zero_exit_is_a_channel_fault() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "error: no devices/emulators found".to_string(),
            exit_code: Some(1),
            entries: Vec::new(),
        };
        let err = ensure_success("force-stop com.example.app", output, true, "trace").expect_err("fault");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(err.error.contains("exit 1"));
        assert!(err.error.contains("no devices"));
    }

    #[test]
    fn zero_exit_with_am_error_is_a_channel_fault() {
        let output = CommandOutput::from_stdout("Error: Activity not started, unable to resolve Intent\n");
        let err = ensure_success("launch", output.clone(), true, "trace").expect_err("fault");
        assert!(err.error.contains("unable to resolve Intent"));
        assert!(ensure_success("shell", output, false, "trace").is_ok());
    }

    #[tokio::test]
    async fn missing_adb_surfaces_as_dependency_error() {
        let adb = AdbChannel::new("modbridge-missing-adb", None);
        let err = adb
            .run(&DeviceCommand::ForceStop("com.example.app".to_string()), "trace-adb")
            .await
            .expect_err("no adb");
        assert_eq!(err.code, "ERR_DEPENDENCY");
    }
}
