use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
    pub transport_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceFileEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Filled by directory listings only.
    #[serde(default)]
    pub entries: Vec<DeviceFileEntry>,
}

impl CommandOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn with_entries(entries: Vec<DeviceFileEntry>) -> Self {
        Self {
            exit_code: Some(0),
            entries,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Uninstall,
    QuickFix,
    RemoveOldModDirectories,
    FixModPermissions,
    ToggleLog,
    RestartApp,
    CreateDump,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 7] = [
        WorkflowKind::Uninstall,
        WorkflowKind::QuickFix,
        WorkflowKind::RemoveOldModDirectories,
        WorkflowKind::FixModPermissions,
        WorkflowKind::ToggleLog,
        WorkflowKind::RestartApp,
        WorkflowKind::CreateDump,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WorkflowKind::Uninstall => "Uninstall app",
            WorkflowKind::QuickFix => "Quick fix",
            WorkflowKind::RemoveOldModDirectories => "Remove mod directories",
            WorkflowKind::FixModPermissions => "Fix mod permissions",
            WorkflowKind::ToggleLog => "Toggle log",
            WorkflowKind::RestartApp => "Restart app",
            WorkflowKind::CreateDump => "Create dump",
        }
    }

    /// Quick fix re-provisions the bridge itself, and log toggling is not
    /// gated at all.
    pub fn requires_bridge(self) -> bool {
        !matches!(self, WorkflowKind::QuickFix | WorkflowKind::ToggleLog)
    }

    pub fn cli_name(self) -> &'static str {
        match self {
            WorkflowKind::Uninstall => "uninstall",
            WorkflowKind::QuickFix => "quick-fix",
            WorkflowKind::RemoveOldModDirectories => "remove-mod-dirs",
            WorkflowKind::FixModPermissions => "fix-permissions",
            WorkflowKind::ToggleLog => "toggle-log",
            WorkflowKind::RestartApp => "restart",
            WorkflowKind::CreateDump => "dump",
        }
    }

    pub fn from_cli_name(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.cli_name() == value)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowPayload {
    LogToggled { streaming: bool, path: PathBuf },
    DumpCreated { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Completed { payload: Option<WorkflowPayload> },
    /// The user declined the confirmation prompt; nothing was done.
    Declined,
}

impl WorkflowOutcome {
    pub fn done() -> Self {
        WorkflowOutcome::Completed { payload: None }
    }

    pub fn with_payload(payload: WorkflowPayload) -> Self {
        WorkflowOutcome::Completed {
            payload: Some(payload),
        }
    }
}

pub type WorkflowResult = Result<WorkflowOutcome, AppError>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
    pub detail: Option<String>,
    pub trace_id: Option<String>,
}

impl Notification {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            body: body.into(),
            detail: None,
            trace_id: None,
        }
    }

    pub fn failure(kind: WorkflowKind, err: &AppError) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: format!("{} failed", kind.label()),
            body: err.error.clone(),
            detail: Some(err.to_string()),
            trace_id: Some(err.trace_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LockSnapshot {
    pub busy: bool,
    pub bridge_available: bool,
}

impl Default for LockSnapshot {
    fn default() -> Self {
        Self {
            busy: false,
            bridge_available: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LogSessionStatus {
    pub streaming: bool,
    pub destination: Option<PathBuf>,
    /// Bumped on every start so waiters can tell sessions apart.
    pub session: u64,
}

impl LogSessionStatus {
    pub fn label(&self) -> &'static str {
        if self.streaming {
            "Stop Logging"
        } else {
            "Start Logging"
        }
    }
}

/// How a streaming command finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    Cancelled,
    Ended { exit_code: Option<i32> },
    Failed(AppError),
}
