use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::adapters::NotificationSink;
use crate::app::adb::channel::CommandChannel;
use crate::app::error::AppError;
use crate::app::models::{LogSessionStatus, Notification, StreamExit};

pub const LOG_STOPPED_TITLE: &str = "Logging stopped";

struct ActiveStream {
    session: u64,
    cancel: CancellationToken,
}

struct Shared {
    active: Mutex<Option<ActiveStream>>,
    status: watch::Sender<LogSessionStatus>,
    notifier: Arc<dyn NotificationSink>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Single exit path into `Stopped`, whatever ended the stream. The status
    /// flips under the same lock that clears the active slot, so a session
    /// started afterwards never sees its status overwritten.
    fn finish(&self, session: u64, exit: StreamExit, trace_id: &str) {
        let destination = {
            let mut active = self.active();
            if active.as_ref().map(|current| current.session) != Some(session) {
                return;
            }
            active.take();
            let mut destination = None;
            self.status.send_if_modified(|status| {
                if status.session != session {
                    return false;
                }
                destination = status.destination.clone();
                status.streaming = false;
                true
            });
            destination
        };

        match &exit {
            StreamExit::Cancelled => debug!(trace_id = %trace_id, session, "log stream cancelled"),
            StreamExit::Ended { exit_code } => {
                info!(trace_id = %trace_id, session, exit_code = ?exit_code, "log stream ended")
            }
            StreamExit::Failed(err) => {
                warn!(trace_id = %trace_id, session, error = %err, "log stream failed")
            }
        }

        let body = match &destination {
            Some(path) => format!("Log written to {}", path.display()),
            None => "Log streaming has stopped".to_string(),
        };
        let mut notification = Notification::info(LOG_STOPPED_TITLE, body);
        notification.trace_id = Some(trace_id.to_string());
        self.notifier.notify(notification);
    }
}

/// Continuous device-log capture into a local file. At most one stream runs
/// at a time; start and stop calls are serialized against each other.
pub struct LogSession {
    channel: Arc<dyn CommandChannel>,
    shared: Arc<Shared>,
    transition: tokio::sync::Mutex<()>,
}

impl LogSession {
    pub fn new(channel: Arc<dyn CommandChannel>, notifier: Arc<dyn NotificationSink>) -> Self {
        let (status, _) = watch::channel(LogSessionStatus::default());
        Self {
            channel,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                status,
                notifier,
            }),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> LogSessionStatus {
        self.shared.status.borrow().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.active().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<LogSessionStatus> {
        self.shared.status.subscribe()
    }

    /// Truncates `destination` and starts streaming into it.
    pub async fn start(&self, destination: &Path, trace_id: &str) -> Result<(), AppError> {
        let _transition = self.transition.lock().await;
        if self.is_streaming() {
            return Err(AppError::already_streaming(trace_id));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                AppError::system(format!("Failed to create log directory: {err}"), trace_id)
            })?;
        }
        let sink = tokio::fs::File::create(destination).await.map_err(|err| {
            AppError::system(
                format!("Failed to open log file {}: {err}", destination.display()),
                trace_id,
            )
        })?;

        let handle = self.channel.start_stream(sink, trace_id).await?;
        let (cancel, finished) = handle.into_parts();

        let session = {
            let mut active = self.shared.active();
            let session = self.shared.status.borrow().session + 1;
            *active = Some(ActiveStream { session, cancel });
            self.shared.status.send_replace(LogSessionStatus {
                streaming: true,
                destination: Some(destination.to_path_buf()),
                session,
            });
            session
        };
        info!(trace_id = %trace_id, session, path = %destination.display(), "log streaming started");

        spawn_termination_watch(Arc::clone(&self.shared), session, finished, trace_id.to_string());
        Ok(())
    }

    /// No-op when nothing is streaming. Otherwise returns once the channel has
    /// acknowledged the cancellation and the session reads as stopped.
    pub async fn stop(&self, trace_id: &str) -> Result<(), AppError> {
        let _transition = self.transition.lock().await;
        let (session, cancel) = match self.shared.active().as_ref() {
            Some(active) => (active.session, active.cancel.clone()),
            None => return Ok(()),
        };

        debug!(trace_id = %trace_id, session, "stopping log stream");
        cancel.cancel();

        let mut status = self.shared.status.subscribe();
        status
            .wait_for(|current| !(current.streaming && current.session == session))
            .await
            .map_err(|_| AppError::system("Log session state channel closed", trace_id))?;
        Ok(())
    }

    pub fn destination(&self) -> Option<PathBuf> {
        self.shared.status.borrow().destination.clone()
    }
}

fn spawn_termination_watch(
    shared: Arc<Shared>,
    session: u64,
    finished: oneshot::Receiver<StreamExit>,
    trace_id: String,
) {
    tokio::spawn(async move {
        // A dropped sender means the channel lost track of the stream.
        let exit = finished.await.unwrap_or(StreamExit::Ended { exit_code: None });
        shared.finish(session, exit, &trace_id);
    });
}
