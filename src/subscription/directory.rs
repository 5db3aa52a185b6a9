use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::subscription::{SubscriptionCallback, SubscriptionManager};
use crate::utils::time::now_ms;

const SINGLE_LEVEL_WILDCARD: &str = "+";
const MULTI_LEVEL_WILDCARD: &str = "*";

/// Matches a multicast id against a pattern whose partitions may hold `+`
/// (exactly one segment) or a trailing `*` (any remaining segments).
pub fn multicast_id_matches(pattern: &str, multicast_id: &str) -> bool {
    let mut id_segments = multicast_id.split('/');
    for segment in pattern.split('/') {
        if segment == MULTI_LEVEL_WILDCARD {
            return true;
        }
        match id_segments.next() {
            Some(_) if segment == SINGLE_LEVEL_WILDCARD => {}
            Some(id_segment) if id_segment == segment => {}
            _ => return false,
        }
    }
    id_segments.next().is_none()
}

struct Entry {
    callback: Arc<dyn SubscriptionCallback>,
    multicast_pattern: Option<String>,
    last_publication_ms: Option<i64>,
}

#[derive(Default)]
pub struct SubscriptionDirectory {
    entries: Mutex<HashMap<String, Entry>>,
}

impl SubscriptionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_subscription(&self, subscription_id: &str, callback: Arc<dyn SubscriptionCallback>) {
        self.insert(subscription_id, callback, None);
    }

    pub fn register_multicast_subscription(
        &self,
        subscription_id: &str,
        multicast_pattern: &str,
        callback: Arc<dyn SubscriptionCallback>,
    ) {
        self.insert(subscription_id, callback, Some(multicast_pattern.to_string()));
    }

    pub fn unregister_subscription(&self, subscription_id: &str) -> bool {
        debug!(subscription_id, "unregistering subscription");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(subscription_id)
            .is_some()
    }

    pub fn last_publication_ms(&self, subscription_id: &str) -> Option<i64> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subscription_id)
            .and_then(|e| e.last_publication_ms)
    }

    fn insert(
        &self,
        subscription_id: &str,
        callback: Arc<dyn SubscriptionCallback>,
        multicast_pattern: Option<String>,
    ) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).insert(
            subscription_id.to_string(),
            Entry {
                callback,
                multicast_pattern,
                last_publication_ms: None,
            },
        );
    }
}

impl SubscriptionManager for SubscriptionDirectory {
    fn subscription_callback(&self, subscription_id: &str) -> Option<Arc<dyn SubscriptionCallback>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subscription_id)
            .map(|e| Arc::clone(&e.callback))
    }

    fn multicast_callbacks(&self, multicast_id: &str) -> Vec<Arc<dyn SubscriptionCallback>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| {
                e.multicast_pattern
                    .as_deref()
                    .is_some_and(|p| multicast_id_matches(p, multicast_id))
            })
            .map(|e| Arc::clone(&e.callback))
            .collect()
    }

    fn touch_subscription_state(&self, subscription_id: &str) {
        if let Some(entry) = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(subscription_id)
        {
            entry.last_publication_ms = Some(now_ms());
        }
    }
}
