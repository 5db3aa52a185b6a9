//! The `sender` module bridges "perform operation X" and "a frozen message
//! has been handed to the router".
//!
//! [`MessageSender`] builds messages through the
//! [`MessageFactory`](crate::factory::MessageFactory), registers reply
//! callers with the dispatcher before routing requests, and decides which
//! failures reach the caller and which are only logged.

#[allow(clippy::module_inception)]
mod sender;

use crate::message::{ImmutableMessage, MessagingQos};
use crate::payload::{MulticastPublication, SubscriptionPublication, SubscriptionReply};
use crate::utils::Result;

pub use sender::MessageSender;

/// Delivers frozen messages. Failures surface as [`Error::Runtime`](crate::utils::Error::Runtime).
pub trait MessageRouter: Send + Sync {
    fn route(&self, message: ImmutableMessage) -> Result<()>;

    fn remove_next_hop(&self, participant_id: &str) -> Result<()>;

    fn add_multicast_receiver(
        &self,
        multicast_id: &str,
        subscriber_id: &str,
        provider_id: &str,
    ) -> Result<()>;

    fn remove_multicast_receiver(
        &self,
        multicast_id: &str,
        subscriber_id: &str,
        provider_id: &str,
    ) -> Result<()>;
}

/// The fire-and-forget sends the publication manager needs.
pub trait PublicationSender: Send + Sync {
    fn send_subscription_reply(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        reply: SubscriptionReply,
    );

    fn send_subscription_publication(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        publication: SubscriptionPublication,
    );

    fn send_multicast(&self, sender_id: &str, qos: &MessagingQos, publication: MulticastPublication);
}
