use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::app::adb::channel::AdbChannel;
use crate::app::error::AppError;
use crate::app::models::{Notification, NotificationLevel};

#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn ask(&self, title: &str, body: &str) -> bool;
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Best effort; callers only log a failure.
pub trait DirectoryOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<(), AppError>;
}

#[async_trait]
pub trait BridgeProvisioner: Send + Sync {
    async fn provision(&self, trace_id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait DumpCreator: Send + Sync {
    /// Returns the path of the created dump file.
    async fn create(&self, trace_id: &str) -> Result<PathBuf, AppError>;
}

/// Routes notifications into the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        let trace_id = notification.trace_id.as_deref().unwrap_or("-");
        match notification.level {
            NotificationLevel::Info => info!(
                trace_id = %trace_id,
                title = %notification.title,
                "{}",
                notification.body
            ),
            NotificationLevel::Error => error!(
                trace_id = %trace_id,
                title = %notification.title,
                detail = notification.detail.as_deref().unwrap_or(""),
                "{}",
                notification.body
            ),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationPrompt for AutoConfirm {
    async fn ask(&self, _title: &str, _body: &str) -> bool {
        true
    }
}

/// Asks on the terminal; anything but `y`/`yes` declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl ConfirmationPrompt for StdinPrompt {
    async fn ask(&self, title: &str, body: &str) -> bool {
        let question = format!("{title}\n{body} [y/N] ");
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(question.as_bytes());
            let _ = stderr.flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(err)) => {
                warn!(error = %err, "failed to read confirmation answer");
                false
            }
            Err(err) => {
                warn!(error = %err, "confirmation prompt task failed");
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Opens a folder in the platform file manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDirectoryOpener;

impl DirectoryOpener for SystemDirectoryOpener {
    fn open(&self, path: &Path) -> Result<(), AppError> {
        let program = if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(windows) {
            "explorer"
        } else {
            "xdg-open"
        };
        let mut command = Command::new(program);
        command
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        spawn_reaped(command).map(|_| ()).map_err(|err| {
            AppError::dependency(format!("Failed to open {}: {err}", path.display()), "")
        })
    }
}

/// Spawns `command` without waiting for it; a background thread reaps the
/// child once it exits.
fn spawn_reaped(mut command: Command) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    let mut child = command.spawn()?;
    Ok(std::thread::spawn(move || child.wait()))
}

/// Quick fix: restarts the adb server so a wedged or mismatched server is
/// replaced by a fresh one.
#[derive(Debug, Clone)]
pub struct AdbServerProvisioner {
    adb: AdbChannel,
}

impl AdbServerProvisioner {
    pub fn new(adb: AdbChannel) -> Self {
        Self { adb }
    }
}

#[async_trait]
impl BridgeProvisioner for AdbServerProvisioner {
    async fn provision(&self, trace_id: &str) -> Result<(), AppError> {
        // kill-server fails harmlessly when no server is running
        if let Err(err) = self.adb.run_host(&["kill-server"], trace_id).await {
            warn!(trace_id = %trace_id, error = %err, "adb kill-server failed");
        }
        self.adb
            .run_host(&["start-server"], trace_id)
            .await
            .map(|_| ())
            .map_err(|err| err.with_context("Failed to restart the adb server"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("  YES "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no"));
    }

    #[tokio::test]
    async fn provisioner_reports_missing_adb() {
        let provisioner = AdbServerProvisioner::new(AdbChannel::new("modbridge-missing-adb", None));
        let err = provisioner.provision("trace-qf").await.expect_err("no adb");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(err.error.starts_with("Failed to restart the adb server"));
    }

    #[cfg(unix)]
    #[test]
    fn opened_process_is_waited_on() {
        let reaper = spawn_reaped(Command::new("true")).expect("spawn");
        let status = reaper.join().expect("reaper thread").expect("wait");
        assert!(status.success());
    }

    #[test]
    fn open_with_missing_program_is_an_error() {
        let err = spawn_reaped(Command::new("modbridge-missing-opener")).expect_err("missing");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn auto_confirm_always_agrees() {
        assert!(AutoConfirm.ask("Uninstall", "Really?").await);
    }
}
