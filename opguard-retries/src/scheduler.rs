//! Timer collaborator used to run delayed retries.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::trace;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(u64);

impl ScheduleHandle {
    /// Create a handle from a raw id, for custom schedulers.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Runs a task after a delay, with the option of cancelling it first.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduleHandle;

    /// Cancel a task that has not started yet. Unknown or already started
    /// handles are ignored.
    fn cancel(&self, handle: ScheduleHandle);

    /// Cancel every pending task.
    fn cancel_all(&self);
}

/// Scheduler backed by `tokio::spawn` and `tokio::time::sleep`.
///
/// Must be used from within a Tokio runtime. Dropping the scheduler cancels
/// every task still waiting for its delay.
#[derive(Debug, Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl TokioScheduler {
    /// Create a new scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks still waiting for their delay.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduleHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);

        // Held across the spawn so the task cannot deregister before it is registered.
        let mut guard = self.pending.lock();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.lock().remove(&id);
            task.await;
        });
        guard.insert(id, join.abort_handle());

        trace!(id, delay_ms = delay.as_millis() as u64, "Scheduled task");
        ScheduleHandle(id)
    }

    fn cancel(&self, handle: ScheduleHandle) {
        if let Some(abort) = self.pending.lock().remove(&handle.0) {
            trace!(id = handle.0, "Cancelled scheduled task");
            abort.abort();
        }
    }

    fn cancel_all(&self) {
        for (_, abort) in self.pending.lock().drain() {
            abort.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
