//! Consumer-side subscription bookkeeping.
//!
//! The dispatcher hands subscription replies and publications to a
//! [`SubscriptionManager`]. [`SubscriptionDirectory`] is the in-process
//! implementation: callbacks by subscription id, multicast callbacks by
//! multicast id pattern, and a last-seen timestamp per subscription.

mod directory;

use std::sync::Arc;

use crate::payload::{PublicationResult, SubscriptionReply};

pub use directory::{SubscriptionDirectory, multicast_id_matches};

/// Receives the outcome of one subscription.
pub trait SubscriptionCallback: Send + Sync {
    fn on_subscription_reply(&self, reply: SubscriptionReply);
    fn on_publication(&self, publication: PublicationResult);
}

pub trait SubscriptionManager: Send + Sync {
    fn subscription_callback(&self, subscription_id: &str) -> Option<Arc<dyn SubscriptionCallback>>;

    /// Every callback whose multicast pattern matches `multicast_id`.
    fn multicast_callbacks(&self, multicast_id: &str) -> Vec<Arc<dyn SubscriptionCallback>>;

    /// Records that a publication for `subscription_id` just arrived.
    fn touch_subscription_state(&self, subscription_id: &str);
}

#[cfg(test)]
mod tests;
