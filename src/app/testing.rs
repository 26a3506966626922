//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::app::adapters::{
    BridgeProvisioner, ConfirmationPrompt, DirectoryOpener, DumpCreator, NotificationSink,
};
use crate::app::adb::channel::{CommandChannel, DeviceCommand, StreamHandle};
use crate::app::error::AppError;
use crate::app::models::{CommandOutput, DeviceFileEntry, Notification, StreamExit};

struct Blocker {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Records every command it receives. Commands succeed unless a failure was
/// scripted for them; listings come from `set_listing`.
#[derive(Default)]
pub struct ScriptedChannel {
    calls: Mutex<Vec<(DeviceCommand, Instant)>>,
    failures: Mutex<Vec<(DeviceCommand, String)>>,
    listings: Mutex<HashMap<String, Vec<String>>>,
    blocker: Mutex<Option<Blocker>>,
    disconnects: Mutex<Vec<oneshot::Sender<()>>>,
    stream_failure: Mutex<Option<String>>,
    streams_started: AtomicUsize,
}

impl ScriptedChannel {
    pub fn fail_on(&self, command: DeviceCommand, message: &str) {
        self.failures
            .lock()
            .expect("failures")
            .push((command, message.to_string()));
    }

    pub fn set_listing(&self, dir: &str, names: &[&str]) {
        self.listings.lock().expect("listings").insert(
            dir.to_string(),
            names.iter().map(|name| name.to_string()).collect(),
        );
    }

    /// The next `run` call parks until `release` is notified.
    pub fn block_next_run(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.blocker.lock().expect("blocker") = Some(Blocker {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });
        (entered, release)
    }

    pub fn fail_streams(&self, message: &str) {
        *self.stream_failure.lock().expect("stream failure") = Some(message.to_string());
    }

    /// Ends every running stream as if the device went away.
    pub fn disconnect_streams(&self) {
        for sender in self.disconnects.lock().expect("disconnects").drain(..) {
            let _ = sender.send(());
        }
    }

    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.calls
            .lock()
            .expect("calls")
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    pub fn timed_commands(&self) -> Vec<(DeviceCommand, Instant)> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn streams_started(&self) -> usize {
        self.streams_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandChannel for ScriptedChannel {
    async fn run(&self, command: &DeviceCommand, trace_id: &str) -> Result<CommandOutput, AppError> {
        let blocker = self.blocker.lock().expect("blocker").take();
        if let Some(blocker) = blocker {
            blocker.entered.notify_one();
            blocker.release.notified().await;
        }

        self.calls
            .lock()
            .expect("calls")
            .push((command.clone(), Instant::now()));

        let failure = self
            .failures
            .lock()
            .expect("failures")
            .iter()
            .find(|(failing, _)| failing == command)
            .map(|(_, message)| message.clone());
        if let Some(message) = failure {
            return Err(AppError::dependency(message, trace_id));
        }

        if let DeviceCommand::ListDir(dir) = command {
            let names = self
                .listings
                .lock()
                .expect("listings")
                .get(dir)
                .cloned()
                .unwrap_or_default();
            let entries = names
                .into_iter()
                .map(|name| DeviceFileEntry {
                    path: format!("{dir}/{name}"),
                    name,
                })
                .collect();
            return Ok(CommandOutput::with_entries(entries));
        }
        Ok(CommandOutput::from_stdout(""))
    }

    async fn start_stream(
        &self,
        _sink: tokio::fs::File,
        trace_id: &str,
    ) -> Result<StreamHandle, AppError> {
        if let Some(message) = self.stream_failure.lock().expect("stream failure").clone() {
            return Err(AppError::dependency(message, trace_id));
        }
        self.streams_started.fetch_add(1, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        let (disconnect_tx, disconnect_rx) = oneshot::channel::<()>();
        self.disconnects
            .lock()
            .expect("disconnects")
            .push(disconnect_tx);

        let token = cancel.clone();
        tokio::spawn(async move {
            let exit = tokio::select! {
                _ = token.cancelled() => StreamExit::Cancelled,
                _ = disconnect_rx => StreamExit::Ended { exit_code: Some(255) },
            };
            let _ = done_tx.send(exit);
        });
        Ok(StreamHandle::new(cancel, done_rx))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().expect("notifications").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.notifications
            .lock()
            .expect("notifications")
            .push(notification);
    }
}

pub struct ScriptedPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationPrompt for ScriptedPrompt {
    async fn ask(&self, _title: &str, _body: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[derive(Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<PathBuf>>,
    fail: AtomicBool,
}

impl RecordingOpener {
    pub fn failing() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().expect("opened").clone()
    }
}

impl DirectoryOpener for RecordingOpener {
    fn open(&self, path: &Path) -> Result<(), AppError> {
        self.opened.lock().expect("opened").push(path.to_path_buf());
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::dependency("no file manager available", ""));
        }
        Ok(())
    }
}

pub struct ScriptedProvisioner {
    failure: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedProvisioner {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BridgeProvisioner for ScriptedProvisioner {
    async fn provision(&self, trace_id: &str) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(AppError::dependency(message.clone(), trace_id)),
            None => Ok(()),
        }
    }
}

pub struct ScriptedDumper {
    result: Result<PathBuf, String>,
    calls: AtomicUsize,
}

impl ScriptedDumper {
    pub fn producing(path: impl Into<PathBuf>) -> Self {
        Self {
            result: Ok(path.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DumpCreator for ScriptedDumper {
    async fn create(&self, trace_id: &str) -> Result<PathBuf, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(|message| AppError::system(message, trace_id))
    }
}
