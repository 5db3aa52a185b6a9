use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::trace;

use crate::provider::{AttributeListener, BroadcastFilter, BroadcastListener};
use crate::publication::PublicationManager;

/// Forwards attribute changes of one on-change subscription.
pub(crate) struct SubscriptionAttributeListener {
    subscription_id: String,
    manager: Weak<PublicationManager>,
}

impl SubscriptionAttributeListener {
    pub(crate) fn new(subscription_id: &str, manager: Weak<PublicationManager>) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            manager,
        }
    }
}

impl AttributeListener for SubscriptionAttributeListener {
    fn attribute_value_changed(&self, value: Value) {
        match self.manager.upgrade() {
            Some(manager) => manager.attribute_value_changed(&self.subscription_id, value),
            None => trace!(subscription_id = %self.subscription_id, "publication manager gone"),
        }
    }
}

/// Forwards broadcasts of one broadcast subscription.
pub(crate) struct UnicastBroadcastListener {
    subscription_id: String,
    manager: Weak<PublicationManager>,
}

impl UnicastBroadcastListener {
    pub(crate) fn new(subscription_id: &str, manager: Weak<PublicationManager>) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            manager,
        }
    }
}

impl BroadcastListener for UnicastBroadcastListener {
    fn broadcast_occurred(&self, values: &[Value], filters: &[Arc<dyn BroadcastFilter>]) {
        let Some(manager) = self.manager.upgrade() else {
            trace!(subscription_id = %self.subscription_id, "publication manager gone");
            return;
        };
        if filters.is_empty() {
            manager.broadcast_occurred(&self.subscription_id, values);
        } else {
            manager.selective_broadcast_occurred(&self.subscription_id, filters, values);
        }
    }
}
