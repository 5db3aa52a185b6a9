use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// Handle to one scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    abort: AbortHandle,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Runs closures after a delay on the Tokio runtime it was created on.
///
/// Tasks for different subscriptions run concurrently; every task can be
/// cancelled through its [`TaskHandle`].
pub struct DelayedScheduler {
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    shut_down: AtomicBool,
}

impl DelayedScheduler {
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        Self {
            runtime: Handle::current(),
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Returns `None` once the scheduler is shut down.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Option<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            debug!("scheduler is shut down, task is dropped");
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        let mut pending = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let join = self.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task();
            tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        });
        let abort = join.abort_handle();
        pending.insert(id, abort.clone());
        trace!(task_id = id, delay_ms = delay.as_millis() as u64, "scheduled task");

        Some(TaskHandle { id, abort })
    }

    /// Cancels a task. A no-op if it already ran or was cancelled.
    pub fn unschedule(&self, handle: &TaskHandle) {
        handle.abort.abort();
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id);
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Cancels everything and rejects further tasks.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, abort)| abort)
            .collect();
        debug!(cancelled = pending.len(), "scheduler shut down");
        for abort in pending {
            abort.abort();
        }
    }
}

impl Drop for DelayedScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
