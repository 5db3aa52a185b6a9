//! The `factory` module turns typed operations into messages.
//!
//! [`MessageFactory`] is pure construction: it stamps the message type,
//! computes the absolute expiry (with the configured TTL uplift for
//! forward-direction messages), copies QoS hints and custom headers, reads
//! the correlation id out of the payload and encodes the payload text.

use std::sync::Arc;

use tracing::trace;

use crate::message::{
    HEADER_REQUEST_REPLY_ID, HEADER_SUBSCRIPTION_ID, ImmutableMessage, Keychain, MessageType,
    MessagingQos, MutableMessage,
};
use crate::payload::{
    BroadcastSubscriptionRequest, Codec, MulticastPublication, MulticastSubscriptionRequest,
    OneWayRequest, Payload, Reply, Request, SubscriptionPublication, SubscriptionReply,
    SubscriptionRequest, SubscriptionStop,
};
use crate::utils::Result;
use crate::utils::time::expiry_from_ttl;

#[derive(Clone)]
pub struct MessageFactory {
    ttl_uplift_ms: u64,
    codec: Arc<dyn Codec>,
    keychain: Option<Arc<dyn Keychain>>,
}

impl MessageFactory {
    pub fn new(ttl_uplift_ms: u64, codec: Arc<dyn Codec>) -> Self {
        Self {
            ttl_uplift_ms,
            codec,
            keychain: None,
        }
    }

    pub fn with_keychain(mut self, keychain: Arc<dyn Keychain>) -> Self {
        self.keychain = Some(keychain);
        self
    }

    pub fn ttl_uplift_ms(&self) -> u64 {
        self.ttl_uplift_ms
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Freezes a finished message, signing it when a keychain is configured.
    pub fn freeze(&self, message: MutableMessage) -> Result<ImmutableMessage> {
        message.freeze(self.keychain.as_deref())
    }

    pub fn create_request(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        request: Request,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(MessageType::Request, sender, recipient, qos, request.into(), is_local)
    }

    pub fn create_one_way_request(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        request: OneWayRequest,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(MessageType::OneWay, sender, recipient, qos, request.into(), is_local)
    }

    pub fn create_reply(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        reply: Reply,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(MessageType::Reply, sender, recipient, qos, reply.into(), is_local)
    }

    pub fn create_subscription_request(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        request: SubscriptionRequest,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(
            MessageType::SubscriptionRequest,
            sender,
            recipient,
            qos,
            request.into(),
            is_local,
        )
    }

    pub fn create_broadcast_subscription_request(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        request: BroadcastSubscriptionRequest,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(
            MessageType::BroadcastSubscriptionRequest,
            sender,
            recipient,
            qos,
            request.into(),
            is_local,
        )
    }

    pub fn create_multicast_subscription_request(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        request: MulticastSubscriptionRequest,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(
            MessageType::MulticastSubscriptionRequest,
            sender,
            recipient,
            qos,
            request.into(),
            is_local,
        )
    }

    pub fn create_subscription_reply(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        reply: SubscriptionReply,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(
            MessageType::SubscriptionReply,
            sender,
            recipient,
            qos,
            reply.into(),
            is_local,
        )
    }

    pub fn create_subscription_stop(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        stop: SubscriptionStop,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(
            MessageType::SubscriptionStop,
            sender,
            recipient,
            qos,
            stop.into(),
            is_local,
        )
    }

    pub fn create_subscription_publication(
        &self,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        publication: SubscriptionPublication,
        is_local: bool,
    ) -> Result<MutableMessage> {
        self.init_message(
            MessageType::Publication,
            sender,
            recipient,
            qos,
            publication.into(),
            is_local,
        )
    }

    /// The recipient of a multicast is its multicast id.
    pub fn create_multicast_publication(
        &self,
        sender: &str,
        qos: &MessagingQos,
        publication: MulticastPublication,
    ) -> Result<MutableMessage> {
        let recipient = publication.multicast_id.clone();
        self.init_message(
            MessageType::Multicast,
            sender,
            &recipient,
            qos,
            publication.into(),
            false,
        )
    }

    fn init_message(
        &self,
        message_type: MessageType,
        sender: &str,
        recipient: &str,
        qos: &MessagingQos,
        payload: Payload,
        is_local: bool,
    ) -> Result<MutableMessage> {
        let mut message = MutableMessage::new(message_type);
        message.sender = sender.to_string();
        message.recipient = recipient.to_string();
        message.local_message = is_local;
        message.effort = qos.effort;
        message.encrypt = qos.encrypt;
        message.compress = qos.compress;

        let uplift = if message_type.is_reply_direction() {
            0
        } else {
            self.ttl_uplift_ms
        };
        message.expiry_date_ms = expiry_from_ttl(qos.ttl_ms, uplift);

        if let Some((key, id)) = correlation_header(&payload) {
            message.set_header(key, id);
        }
        for (key, value) in &qos.custom_headers {
            message.set_custom_header(key, value.clone());
        }

        message.payload = self.codec.encode(&payload)?;

        trace!(
            message_id = %message.id(),
            message_type = %message_type,
            expiry = message.expiry_date_ms,
            "created message"
        );
        Ok(message)
    }
}

fn correlation_header(payload: &Payload) -> Option<(&'static str, String)> {
    match payload {
        Payload::Request(r) => Some((HEADER_REQUEST_REPLY_ID, r.request_reply_id.clone())),
        Payload::Reply(r) => Some((HEADER_REQUEST_REPLY_ID, r.request_reply_id.clone())),
        Payload::SubscriptionRequest(r) => Some((HEADER_SUBSCRIPTION_ID, r.subscription_id.clone())),
        Payload::BroadcastSubscriptionRequest(r) => {
            Some((HEADER_SUBSCRIPTION_ID, r.subscription_id.clone()))
        }
        Payload::MulticastSubscriptionRequest(r) => {
            Some((HEADER_SUBSCRIPTION_ID, r.subscription_id.clone()))
        }
        Payload::SubscriptionReply(r) => Some((HEADER_SUBSCRIPTION_ID, r.subscription_id.clone())),
        Payload::SubscriptionStop(r) => Some((HEADER_SUBSCRIPTION_ID, r.subscription_id.clone())),
        Payload::SubscriptionPublication(r) => {
            Some((HEADER_SUBSCRIPTION_ID, r.subscription_id.clone()))
        }
        Payload::OneWayRequest(_) | Payload::MulticastPublication(_) => None,
    }
}

#[cfg(test)]
mod tests;
