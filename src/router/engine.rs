use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, trace, warn};

use crate::dispatcher::Dispatcher;
use crate::message::{ImmutableMessage, MessageType};
use crate::router::receivers::{MulticastReceivers, ParticipantId};
use crate::sender::MessageRouter;
use crate::subscription::multicast_id_matches;
use crate::utils::time::now_ms;
use crate::utils::{Error, Result};

/// Routes messages between participants living in this process.
///
/// Every participant id is mapped to the dispatcher serving it. Multicast
/// receivers are grouped by the pattern they subscribed with.
#[derive(Default)]
pub struct LocalMessageRouter {
    next_hops: Mutex<HashMap<ParticipantId, Weak<Dispatcher>>>,
    multicast_receivers: Mutex<HashMap<String, MulticastReceivers>>,
}

impl LocalMessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages addressed to `participant_id` are handed to `dispatcher`.
    pub fn add_next_hop(&self, participant_id: &str, dispatcher: &Arc<Dispatcher>) {
        self.next_hops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(participant_id.to_string(), Arc::downgrade(dispatcher));
        debug!(participant_id, "added next hop");
    }

    pub fn has_next_hop(&self, participant_id: &str) -> bool {
        self.next_hops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(participant_id)
    }

    /// Number of receivers registered under exactly this pattern.
    pub fn multicast_receiver_count(&self, pattern: &str) -> usize {
        self.multicast_receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
            .map_or(0, |receivers| receivers.receivers.len())
    }

    fn dispatcher_for(&self, participant_id: &str) -> Option<Arc<Dispatcher>> {
        self.next_hops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(participant_id)
            .and_then(Weak::upgrade)
    }

    /// One dispatcher per subscriber set, even if several subscribers share it.
    fn multicast_dispatchers(&self, multicast_id: &str) -> Vec<Arc<Dispatcher>> {
        let subscribers: Vec<ParticipantId> = self
            .multicast_receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|receivers| multicast_id_matches(&receivers.pattern, multicast_id))
            .flat_map(|receivers| receivers.subscribers().map(str::to_string).collect::<Vec<_>>())
            .collect();

        let mut dispatchers: Vec<Arc<Dispatcher>> = Vec::new();
        for subscriber in subscribers {
            match self.dispatcher_for(&subscriber) {
                Some(dispatcher) => {
                    if !dispatchers.iter().any(|known| Arc::ptr_eq(known, &dispatcher)) {
                        dispatchers.push(dispatcher);
                    }
                }
                None => warn!(subscriber_id = %subscriber, multicast_id, "no next hop for multicast receiver"),
            }
        }
        dispatchers
    }
}

impl MessageRouter for LocalMessageRouter {
    fn route(&self, message: ImmutableMessage) -> Result<()> {
        if message.is_expired(now_ms()) {
            warn!(message = %message, "expired message is not routed");
            return Err(Error::Runtime(format!("message {} expired", message.id())));
        }

        if message.message_type() == MessageType::Multicast {
            let dispatchers = self.multicast_dispatchers(message.recipient());
            if dispatchers.is_empty() {
                debug!(multicast_id = message.recipient(), "no receivers for multicast");
                return Ok(());
            }
            for dispatcher in dispatchers {
                dispatcher.receive(message.clone());
            }
            return Ok(());
        }

        match self.dispatcher_for(message.recipient()) {
            Some(dispatcher) => {
                trace!(message = %message, "routing to local dispatcher");
                dispatcher.receive(message);
                Ok(())
            }
            None => Err(Error::Runtime(format!(
                "no route to participant {}",
                message.recipient()
            ))),
        }
    }

    fn remove_next_hop(&self, participant_id: &str) -> Result<()> {
        self.next_hops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(participant_id);
        debug!(participant_id, "removed next hop");
        Ok(())
    }

    fn add_multicast_receiver(
        &self,
        multicast_id: &str,
        subscriber_id: &str,
        provider_id: &str,
    ) -> Result<()> {
        if multicast_id.is_empty() {
            return Err(Error::InvalidArgument("multicast id must not be empty".to_string()));
        }
        self.multicast_receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(multicast_id.to_string())
            .or_insert_with(|| MulticastReceivers::new(multicast_id))
            .subscribe(subscriber_id, provider_id);
        debug!(multicast_id, subscriber_id, provider_id, "added multicast receiver");
        Ok(())
    }

    fn remove_multicast_receiver(
        &self,
        multicast_id: &str,
        subscriber_id: &str,
        provider_id: &str,
    ) -> Result<()> {
        let mut receivers = self
            .multicast_receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = receivers.get_mut(multicast_id) {
            entry.unsubscribe(subscriber_id, provider_id);
            if entry.is_empty() {
                receivers.remove(multicast_id);
            }
        }
        debug!(multicast_id, subscriber_id, provider_id, "removed multicast receiver");
        Ok(())
    }
}
