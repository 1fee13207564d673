//! One-shot delayed task scheduling.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Handle returned by [`Scheduler::schedule_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    id: TaskId,
    delay: Duration,
}

impl TaskHandle {
    /// Create a handle for a freshly scheduled task.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            id: TaskId::new(),
            delay,
        }
    }

    /// Get the task ID.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Get the delay the task was scheduled with.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

/// Runs tasks once after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TaskHandle;

    /// Cancel a task. Returns `true` if it was still pending.
    ///
    /// Cancelling a fired or already-cancelled task does nothing.
    fn cancel(&self, handle: &TaskHandle) -> bool;
}

/// Scheduler backed by tokio timers.
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Handle,
    pending: Arc<Mutex<HashMap<TaskId, AbortHandle>>>,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto `runtime`.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a scheduler on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchedulerUnavailable` outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::scheduler_unavailable(e.to_string()))
    }

    /// Number of tasks that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TaskHandle {
        let handle = TaskHandle::new(delay);
        let id = handle.id();
        let pending = Arc::clone(&self.pending);

        // Hold the map while spawning so the task cannot deregister before it
        // is registered.
        let mut guard = self.pending.lock();
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let registered = pending.lock().remove(&id).is_some();
            if registered {
                task.await;
            }
        });
        guard.insert(id, join.abort_handle());
        drop(guard);

        debug!(task_id = %id, delay_ms = delay.as_millis(), "Task scheduled");
        handle
    }

    fn cancel(&self, handle: &TaskHandle) -> bool {
        let removed = self.pending.lock().remove(&handle.id());
        match removed {
            Some(abort) => {
                abort.abort();
                debug!(task_id = %handle.id(), "Task cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, abort) in self.pending.lock().drain() {
            abort.abort();
        }
    }
}

/// Scheduler that only runs tasks when told to.
///
/// Useful in tests and when an external timer wheel drives re-checks.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    pending: BTreeMap<TaskId, (Duration, BoxFuture<'static, ()>)>,
    scheduled: usize,
    cancelled: usize,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks waiting to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Total tasks ever scheduled.
    #[must_use]
    pub fn scheduled_count(&self) -> usize {
        self.state.lock().scheduled
    }

    /// Total successful cancellations.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.state.lock().cancelled
    }

    /// Delays of the pending tasks.
    #[must_use]
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.state.lock().pending.values().map(|(delay, _)| *delay).collect()
    }

    /// Run every task pending right now. Returns how many ran.
    ///
    /// Tasks scheduled while these run stay pending.
    pub async fn fire_all(&self) -> usize {
        let due = std::mem::take(&mut self.state.lock().pending);
        let count = due.len();
        for (_, (_, task)) in due {
            task.await;
        }
        count
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("pending", &state.pending.len())
            .field("scheduled", &state.scheduled)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TaskHandle {
        let handle = TaskHandle::new(delay);
        let mut state = self.state.lock();
        state.pending.insert(handle.id(), (delay, task));
        state.scheduled = state.scheduled.saturating_add(1);
        handle
    }

    fn cancel(&self, handle: &TaskHandle) -> bool {
        let mut state = self.state.lock();
        let removed = state.pending.remove(&handle.id()).is_some();
        if removed {
            state.cancelled = state.cancelled.saturating_add(1);
        }
        removed
    }
}
