use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::payload::BroadcastFilterParameters;

/// Notified synchronously by provider code when an attribute changes.
pub trait AttributeListener: Send + Sync {
    fn attribute_value_changed(&self, value: Value);
}

/// Notified synchronously by provider code when a broadcast fires.
///
/// `filters` are the provider's filters for that broadcast; an empty slice
/// means the broadcast is unconditional.
pub trait BroadcastListener: Send + Sync {
    fn broadcast_occurred(&self, values: &[Value], filters: &[Arc<dyn BroadcastFilter>]);
}

/// Decides per subscription whether a selective broadcast is forwarded.
pub trait BroadcastFilter: Send + Sync {
    fn filter_forward(&self, values: &[Value], filter_parameters: &BroadcastFilterParameters) -> bool;
}

/// Listener bookkeeping a provider embeds to implement the listener half of
/// [`RequestCaller`](crate::provider::RequestCaller).
///
/// Listeners are snapshotted before being called so provider code never
/// holds this registry's lock while the publication manager runs.
#[derive(Default)]
pub struct ListenerRegistry {
    attribute_listeners: Mutex<HashMap<String, Vec<Arc<dyn AttributeListener>>>>,
    broadcast_listeners: Mutex<HashMap<String, Vec<Arc<dyn BroadcastListener>>>>,
    broadcast_filters: Mutex<HashMap<String, Vec<Arc<dyn BroadcastFilter>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attribute_listener(&self, attribute_name: &str, listener: Arc<dyn AttributeListener>) {
        self.attribute_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(attribute_name.to_string())
            .or_default()
            .push(listener);
    }

    pub fn remove_attribute_listener(
        &self,
        attribute_name: &str,
        listener: &Arc<dyn AttributeListener>,
    ) {
        let mut listeners = self
            .attribute_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = listeners.get_mut(attribute_name) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
            if list.is_empty() {
                listeners.remove(attribute_name);
            }
        }
    }

    pub fn add_broadcast_listener(&self, broadcast_name: &str, listener: Arc<dyn BroadcastListener>) {
        self.broadcast_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(broadcast_name.to_string())
            .or_default()
            .push(listener);
    }

    pub fn remove_broadcast_listener(
        &self,
        broadcast_name: &str,
        listener: &Arc<dyn BroadcastListener>,
    ) {
        let mut listeners = self
            .broadcast_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = listeners.get_mut(broadcast_name) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
            if list.is_empty() {
                listeners.remove(broadcast_name);
            }
        }
    }

    pub fn add_broadcast_filter(&self, broadcast_name: &str, filter: Arc<dyn BroadcastFilter>) {
        self.broadcast_filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(broadcast_name.to_string())
            .or_default()
            .push(filter);
    }

    pub fn attribute_listener_count(&self, attribute_name: &str) -> usize {
        self.attribute_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(attribute_name)
            .map_or(0, Vec::len)
    }

    pub fn broadcast_listener_count(&self, broadcast_name: &str) -> usize {
        self.broadcast_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(broadcast_name)
            .map_or(0, Vec::len)
    }

    /// Tells every listener of `attribute_name` about a new value.
    pub fn attribute_value_changed(&self, attribute_name: &str, value: Value) {
        let listeners: Vec<_> = self
            .attribute_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(attribute_name)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener.attribute_value_changed(value.clone());
        }
    }

    /// Fires an unconditional broadcast.
    pub fn fire_broadcast(&self, broadcast_name: &str, values: &[Value]) {
        for listener in self.broadcast_snapshot(broadcast_name) {
            listener.broadcast_occurred(values, &[]);
        }
    }

    /// Fires a broadcast through the filters registered for it.
    pub fn fire_selective_broadcast(&self, broadcast_name: &str, values: &[Value]) {
        let filters: Vec<_> = self
            .broadcast_filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(broadcast_name)
            .cloned()
            .unwrap_or_default();
        for listener in self.broadcast_snapshot(broadcast_name) {
            listener.broadcast_occurred(values, &filters);
        }
    }

    fn broadcast_snapshot(&self, broadcast_name: &str) -> Vec<Arc<dyn BroadcastListener>> {
        self.broadcast_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(broadcast_name)
            .cloned()
            .unwrap_or_default()
    }
}
