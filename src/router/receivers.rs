use std::collections::HashSet;

pub type ParticipantId = String;

/// Subscribers registered for one multicast id pattern.
///
/// A pattern is a multicast id whose partitions may contain the `+` and
/// `*` wildcards. Each entry pairs the subscribing proxy with the provider
/// it subscribed at.
#[derive(Debug, Default)]
pub struct MulticastReceivers {
    pub pattern: String,
    pub receivers: HashSet<(ParticipantId, ParticipantId)>,
}

impl MulticastReceivers {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            receivers: HashSet::new(),
        }
    }

    /// Adding the same pair twice has no effect.
    pub fn subscribe(&mut self, subscriber_id: &str, provider_id: &str) {
        self.receivers
            .insert((subscriber_id.to_string(), provider_id.to_string()));
    }

    pub fn unsubscribe(&mut self, subscriber_id: &str, provider_id: &str) -> bool {
        self.receivers
            .remove(&(subscriber_id.to_string(), provider_id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &str> {
        self.receivers.iter().map(|(subscriber, _)| subscriber.as_str())
    }
}
