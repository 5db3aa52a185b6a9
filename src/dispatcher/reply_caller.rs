use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::payload::Reply;
use crate::utils::time::duration_until;

/// Waits for the reply to one request.
pub trait ReplyCaller: Send + Sync {
    fn execute(&self, reply: Reply);

    /// Called instead of `execute` when the request expired unanswered.
    fn time_out(&self);
}

struct PendingReply {
    caller: Arc<dyn ReplyCaller>,
    gc_task: AbortHandle,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingReply>>>;

/// Pending reply callers by request-reply id. Each entry carries a task
/// that removes it and times the caller out once its expiry passes.
pub struct ReplyCallerDirectory {
    runtime: Handle,
    pending: PendingMap,
    // Written only under the `pending` lock.
    closed: AtomicBool,
}

impl ReplyCallerDirectory {
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        Self {
            runtime: Handle::current(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Ignored once the directory is shut down.
    pub fn add(&self, request_reply_id: &str, caller: Arc<dyn ReplyCaller>, expiry_date_ms: i64) {
        let pending = Arc::clone(&self.pending);
        let key = request_reply_id.to_string();
        let expected = Arc::clone(&caller);

        let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            debug!(request_reply_id, "reply caller directory is shut down, caller not added");
            return;
        }
        let gc_task = self.runtime.spawn(async move {
            tokio::time::sleep(duration_until(expiry_date_ms)).await;
            let expired = {
                let mut map = pending.lock().unwrap_or_else(PoisonError::into_inner);
                match map.get(&key) {
                    Some(entry) if Arc::ptr_eq(&entry.caller, &expected) => map.remove(&key),
                    _ => None,
                }
            };
            if let Some(entry) = expired {
                debug!(request_reply_id = %key, "reply caller expired");
                entry.caller.time_out();
            }
        });

        let entry = PendingReply {
            caller,
            gc_task: gc_task.abort_handle(),
        };
        if let Some(previous) = map.insert(request_reply_id.to_string(), entry) {
            previous.gc_task.abort();
        }
    }

    /// Removes and returns the caller, so every reply id is consumed once.
    pub fn take(&self, request_reply_id: &str) -> Option<Arc<dyn ReplyCaller>> {
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_reply_id)?;
        entry.gc_task.abort();
        Some(entry.caller)
    }

    pub fn remove(&self, request_reply_id: &str) -> bool {
        self.take(request_reply_id).is_some()
    }

    pub fn contains(&self, request_reply_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(request_reply_id)
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::Release);
            map.drain().collect()
        };
        for (_, entry) in drained {
            entry.gc_task.abort();
        }
    }
}

impl Drop for ReplyCallerDirectory {
    fn drop(&mut self) {
        self.shutdown();
    }
}
