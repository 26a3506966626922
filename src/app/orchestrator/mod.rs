use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::adapters::{
    AdbServerProvisioner, BridgeProvisioner, ConfirmationPrompt, DirectoryOpener, DumpCreator,
    NotificationSink,
};
use crate::app::adb::channel::{AdbChannel, CommandChannel, DeviceCommand};
use crate::app::config::AppConfig;
use crate::app::dump::DiagnosticsDumpCreator;
use crate::app::error::AppError;
use crate::app::log_session::LogSession;
use crate::app::models::{
    LockSnapshot, LogSessionStatus, Notification, WorkflowKind, WorkflowOutcome, WorkflowPayload,
    WorkflowResult,
};
use crate::app::operation_lock::OperationLock;

/// Gap between the two launches in the restart workflow. The second launch
/// dismisses the device's "restore app" prompt.
pub const RESTART_RELAUNCH_DELAY: Duration = Duration::from_millis(1000);
pub const MAIN_ACTIVITY: &str = "com.unity3d.player.UnityPlayerActivity";
pub const APP_DATA_ROOT: &str = "/sdcard/Android/data";
pub const MODS_DIR_NAME: &str = "mods";
pub const LIBS_DIR_NAME: &str = "libs";
pub const REMOVE_DIRS_MODE: &str = "777";
pub const FIX_PERMISSIONS_MODE: &str = "+r";

/// The mod loader's two directories on the device, in the order workflows
/// touch them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDirectories {
    pub mods: String,
    pub libs: String,
}

impl ModDirectories {
    pub fn for_app(app_id: &str) -> Self {
        let files = format!("{APP_DATA_ROOT}/{app_id}/files");
        Self {
            mods: format!("{files}/{MODS_DIR_NAME}"),
            libs: format!("{files}/{LIBS_DIR_NAME}"),
        }
    }

    pub fn paths(&self) -> [&str; 2] {
        [&self.mods, &self.libs]
    }

    pub fn contents_wildcards(&self) -> Vec<String> {
        self.paths()
            .iter()
            .map(|dir| format!("{}/*", dir.trim_end_matches('/')))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub app_id: String,
    pub log_file: PathBuf,
    pub mod_dirs: ModDirectories,
}

impl WorkflowSettings {
    pub fn new(app_id: impl Into<String>, log_file: impl Into<PathBuf>) -> Self {
        let app_id = app_id.into();
        Self {
            mod_dirs: ModDirectories::for_app(&app_id),
            app_id,
            log_file: log_file.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.app_id.clone(), config.log_file_path())
    }
}

/// Everything outside this layer that workflows call into.
pub struct Collaborators {
    pub channel: Arc<dyn CommandChannel>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
    pub notifier: Arc<dyn NotificationSink>,
    pub opener: Arc<dyn DirectoryOpener>,
    pub provisioner: Arc<dyn BridgeProvisioner>,
    pub dumper: Arc<dyn DumpCreator>,
}

pub struct Orchestrator {
    settings: WorkflowSettings,
    lock: Arc<OperationLock>,
    log_session: LogSession,
    channel: Arc<dyn CommandChannel>,
    prompt: Arc<dyn ConfirmationPrompt>,
    notifier: Arc<dyn NotificationSink>,
    opener: Arc<dyn DirectoryOpener>,
    provisioner: Arc<dyn BridgeProvisioner>,
    dumper: Arc<dyn DumpCreator>,
}

fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

impl Orchestrator {
    pub fn new(settings: WorkflowSettings, lock: Arc<OperationLock>, collaborators: Collaborators) -> Self {
        let log_session = LogSession::new(
            Arc::clone(&collaborators.channel),
            Arc::clone(&collaborators.notifier),
        );
        Self {
            settings,
            lock,
            log_session,
            channel: collaborators.channel,
            prompt: collaborators.prompt,
            notifier: collaborators.notifier,
            opener: collaborators.opener,
            provisioner: collaborators.provisioner,
            dumper: collaborators.dumper,
        }
    }

    /// Wires the adb-backed channel, provisioner and dump creator.
    pub fn from_config(
        config: &AppConfig,
        lock: Arc<OperationLock>,
        prompt: Arc<dyn ConfirmationPrompt>,
        notifier: Arc<dyn NotificationSink>,
        opener: Arc<dyn DirectoryOpener>,
    ) -> Self {
        let adb = AdbChannel::from_config(config);
        let collaborators = Collaborators {
            channel: Arc::new(adb.clone()),
            prompt,
            notifier,
            opener,
            provisioner: Arc::new(AdbServerProvisioner::new(adb)),
            dumper: Arc::new(DiagnosticsDumpCreator::from_config(config)),
        };
        Self::new(WorkflowSettings::from_config(config), lock, collaborators)
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn lock_snapshot(&self) -> LockSnapshot {
        self.lock.snapshot()
    }

    pub fn subscribe_lock(&self) -> watch::Receiver<LockSnapshot> {
        self.lock.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.log_session.is_streaming()
    }

    pub fn log_status(&self) -> LogSessionStatus {
        self.log_session.status()
    }

    pub fn log_button_label(&self) -> &'static str {
        self.log_session.status().label()
    }

    pub fn subscribe_log(&self) -> watch::Receiver<LogSessionStatus> {
        self.log_session.subscribe()
    }

    pub async fn run(&self, kind: WorkflowKind) -> WorkflowResult {
        match kind {
            WorkflowKind::Uninstall => self.uninstall().await,
            WorkflowKind::QuickFix => self.quick_fix().await,
            WorkflowKind::RemoveOldModDirectories => self.remove_old_mod_directories().await,
            WorkflowKind::FixModPermissions => self.fix_mod_permissions().await,
            WorkflowKind::ToggleLog => self.toggle_log().await,
            WorkflowKind::RestartApp => self.restart_app().await,
            WorkflowKind::CreateDump => self.create_dump().await,
        }
    }

    pub async fn uninstall(&self) -> WorkflowResult {
        let trace_id = new_trace_id();
        self.guarded(WorkflowKind::Uninstall, &trace_id, self.uninstall_steps(&trace_id))
            .await
    }

    pub async fn quick_fix(&self) -> WorkflowResult {
        let trace_id = new_trace_id();
        self.guarded(WorkflowKind::QuickFix, &trace_id, self.quick_fix_steps(&trace_id))
            .await
    }

    pub async fn remove_old_mod_directories(&self) -> WorkflowResult {
        let trace_id = new_trace_id();
        self.guarded(
            WorkflowKind::RemoveOldModDirectories,
            &trace_id,
            self.remove_mod_directories_steps(&trace_id),
        )
        .await
    }

    pub async fn fix_mod_permissions(&self) -> WorkflowResult {
        let trace_id = new_trace_id();
        self.guarded(
            WorkflowKind::FixModPermissions,
            &trace_id,
            self.fix_permissions_steps(&trace_id),
        )
        .await
    }

    pub async fn restart_app(&self) -> WorkflowResult {
        let trace_id = new_trace_id();
        self.guarded(WorkflowKind::RestartApp, &trace_id, self.restart_steps(&trace_id))
            .await
    }

    pub async fn create_dump(&self) -> WorkflowResult {
        let trace_id = new_trace_id();
        self.guarded(WorkflowKind::CreateDump, &trace_id, self.dump_steps(&trace_id))
            .await
    }

    /// Log capture may run alongside other workflows, so it bypasses the
    /// operation lock; start and stop are serialized by the session itself.
    pub async fn toggle_log(&self) -> WorkflowResult {
        let kind = WorkflowKind::ToggleLog;
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, workflow = %kind, "workflow started");
        let result = self.toggle_log_steps(&trace_id).await;
        self.report(kind, &trace_id, result)
    }

    async fn guarded<F>(&self, kind: WorkflowKind, trace_id: &str, steps: F) -> WorkflowResult
    where
        F: Future<Output = WorkflowResult>,
    {
        info!(trace_id = %trace_id, workflow = %kind, "workflow started");
        let result = match self.lock.start_operation(kind.requires_bridge(), trace_id) {
            Ok(guard) => {
                let result = steps.await;
                drop(guard);
                result
            }
            Err(err) => Err(err),
        };
        self.report(kind, trace_id, result)
    }

    fn report(&self, kind: WorkflowKind, trace_id: &str, result: WorkflowResult) -> WorkflowResult {
        match result {
            Ok(outcome) => {
                match &outcome {
                    WorkflowOutcome::Declined => {
                        info!(trace_id = %trace_id, workflow = %kind, "workflow declined by user")
                    }
                    WorkflowOutcome::Completed { .. } => {
                        info!(trace_id = %trace_id, workflow = %kind, "workflow completed")
                    }
                }
                if let Some(notification) = success_notification(kind, &outcome) {
                    self.notifier.notify(Notification {
                        trace_id: Some(trace_id.to_string()),
                        ..notification
                    });
                }
                Ok(outcome)
            }
            Err(err) => {
                let err = err.with_context(kind.label());
                error!(
                    trace_id = %trace_id,
                    workflow = %kind,
                    code = %err.code,
                    error = %err.error,
                    "workflow failed"
                );
                self.notifier.notify(Notification::failure(kind, &err));
                Err(err)
            }
        }
    }

    async fn device(&self, command: DeviceCommand, trace_id: &str) -> Result<(), AppError> {
        debug!(trace_id = %trace_id, command = %command, "device command");
        self.channel.run(&command, trace_id).await.map(|_| ())
    }

    async fn uninstall_steps(&self, trace_id: &str) -> WorkflowResult {
        let app_id = &self.settings.app_id;
        let confirmed = self
            .prompt
            .ask(
                "Uninstall app",
                &format!("{app_id} and all of its mods will be removed from the device. Continue?"),
            )
            .await;
        if !confirmed {
            return Ok(WorkflowOutcome::Declined);
        }
        self.device(DeviceCommand::Uninstall(app_id.clone()), trace_id)
            .await?;
        Ok(WorkflowOutcome::done())
    }

    async fn quick_fix_steps(&self, trace_id: &str) -> WorkflowResult {
        self.provisioner.provision(trace_id).await?;
        Ok(WorkflowOutcome::done())
    }

    /// No rollback: when the second removal fails, the first stays removed.
    async fn remove_mod_directories_steps(&self, trace_id: &str) -> WorkflowResult {
        let dirs = self.settings.mod_dirs.paths();
        self.device(
            DeviceCommand::Chmod {
                paths: dirs.iter().map(|dir| dir.to_string()).collect(),
                mode: REMOVE_DIRS_MODE.to_string(),
                recursive: true,
            },
            trace_id,
        )
        .await?;
        for dir in dirs {
            self.device(DeviceCommand::RemoveDir(dir.to_string()), trace_id)
                .await
                .map_err(|err| err.with_context(format!("Failed to remove {dir}")))?;
        }
        Ok(WorkflowOutcome::done())
    }

    async fn fix_permissions_steps(&self, trace_id: &str) -> WorkflowResult {
        let dirs = &self.settings.mod_dirs;
        let checks = [
            (
                dirs.mods.as_str(),
                "Mod files are not copied. Install the mod loader and your mods first.",
            ),
            (
                dirs.libs.as_str(),
                "Library files are not copied. Install the mod loader and your mods first.",
            ),
        ];
        for (dir, missing_message) in checks {
            let listing = self.channel.run(&DeviceCommand::ListDir(dir.to_string()), trace_id).await?;
            if listing.entries.is_empty() {
                return Err(AppError::precondition(missing_message, trace_id));
            }
        }
        self.device(
            DeviceCommand::Chmod {
                paths: dirs.contents_wildcards(),
                mode: FIX_PERMISSIONS_MODE.to_string(),
                recursive: false,
            },
            trace_id,
        )
        .await?;
        Ok(WorkflowOutcome::done())
    }

    async fn restart_steps(&self, trace_id: &str) -> WorkflowResult {
        let app_id = self.settings.app_id.clone();
        let launch = DeviceCommand::LaunchActivity {
            app_id: app_id.clone(),
            activity: MAIN_ACTIVITY.to_string(),
        };
        self.device(DeviceCommand::ForceStop(app_id), trace_id).await?;
        self.device(launch.clone(), trace_id).await?;
        tokio::time::sleep(RESTART_RELAUNCH_DELAY).await;
        self.device(launch, trace_id).await?;
        Ok(WorkflowOutcome::done())
    }

    async fn dump_steps(&self, trace_id: &str) -> WorkflowResult {
        let path = self.dumper.create(trace_id).await?;
        let folder = path.parent().map(PathBuf::from).unwrap_or_else(|| path.clone());
        if let Err(err) = self.opener.open(&folder) {
            warn!(
                trace_id = %trace_id,
                folder = %folder.display(),
                error = %err,
                "could not open dump folder"
            );
        }
        Ok(WorkflowOutcome::with_payload(WorkflowPayload::DumpCreated { path }))
    }

    async fn toggle_log_steps(&self, trace_id: &str) -> WorkflowResult {
        let path = self.settings.log_file.clone();
        if self.log_session.is_streaming() {
            self.log_session.stop(trace_id).await?;
            Ok(WorkflowOutcome::with_payload(WorkflowPayload::LogToggled {
                streaming: false,
                path: self.log_session.destination().unwrap_or(path),
            }))
        } else {
            self.log_session.start(&path, trace_id).await?;
            Ok(WorkflowOutcome::with_payload(WorkflowPayload::LogToggled {
                streaming: true,
                path,
            }))
        }
    }
}

/// Successful runs stay quiet unless the user needs to know something.
/// Stopping the log is announced by the log session itself.
fn success_notification(kind: WorkflowKind, outcome: &WorkflowOutcome) -> Option<Notification> {
    let WorkflowOutcome::Completed { payload } = outcome else {
        return None;
    };
    match (kind, payload) {
        (WorkflowKind::QuickFix, _) => Some(Notification::info(
            "Quick fix complete",
            "The device bridge has been restarted.",
        )),
        (WorkflowKind::RemoveOldModDirectories, _) => Some(Notification::info(
            "Mod directories removed",
            "The old mod and library directories were deleted.",
        )),
        (WorkflowKind::FixModPermissions, _) => Some(Notification::info(
            "Permissions fixed",
            "Mod and library files are now readable.",
        )),
        (WorkflowKind::CreateDump, Some(WorkflowPayload::DumpCreated { path })) => Some(
            Notification::info("Dump created", format!("Saved to {}", path.display())),
        ),
        (
            WorkflowKind::ToggleLog,
            Some(WorkflowPayload::LogToggled {
                streaming: true,
                path,
            }),
        ) => Some(Notification::info(
            "Logging started",
            format!("Writing device log to {}", path.display()),
        )),
        _ => None,
    }
}
