use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::app::error::AppError;
use crate::app::models::LockSnapshot;

/// Serializes device workflows. Also carries the "bridge available" flag that
/// UI bindings use to disable bridge-dependent actions while the bridge
/// itself is being replaced.
#[derive(Debug)]
pub struct OperationLock {
    state: watch::Sender<LockSnapshot>,
}

impl Default for OperationLock {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationLock {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LockSnapshot::default());
        Self { state }
    }

    pub fn snapshot(&self) -> LockSnapshot {
        *self.state.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.snapshot().busy
    }

    pub fn subscribe(&self) -> watch::Receiver<LockSnapshot> {
        self.state.subscribe()
    }

    /// Marks an operation as running. Starting while another operation holds
    /// the lock is refused with `ERR_BUSY`; the holder is left untouched.
    pub fn start_operation(
        self: &Arc<Self>,
        requires_bridge: bool,
        trace_id: &str,
    ) -> Result<OperationGuard, AppError> {
        let mut acquired = false;
        self.state.send_if_modified(|state| {
            if state.busy {
                return false;
            }
            state.busy = true;
            state.bridge_available = requires_bridge;
            acquired = true;
            true
        });
        if !acquired {
            return Err(AppError::busy(
                "Another operation is already in progress",
                trace_id,
            ));
        }
        debug!(trace_id = %trace_id, requires_bridge, "operation started");
        Ok(OperationGuard {
            lock: Arc::clone(self),
        })
    }

    fn finish_operation(&self) {
        self.state.send_modify(|state| {
            state.busy = false;
            state.bridge_available = true;
        });
        debug!("operation finished");
    }
}

/// Releases the lock when dropped, including during unwinding.
#[derive(Debug)]
#[must_use = "dropping the guard ends the operation"]
pub struct OperationGuard {
    lock: Arc<OperationLock>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.lock.finish_operation();
    }
}
