use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::qos::MessagingQosEffort;
use crate::utils::{Error, Result};

/// Prefix distinguishing user headers from protocol headers.
pub const CUSTOM_HEADER_PREFIX: &str = "c-";
/// Correlates request, reply and one-way messages.
pub const HEADER_REQUEST_REPLY_ID: &str = "request-reply-id";
/// Correlates every message belonging to one subscription.
pub const HEADER_SUBSCRIPTION_ID: &str = "subscription-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "request")]
    Request,
    #[serde(rename = "oneWay")]
    OneWay,
    #[serde(rename = "reply")]
    Reply,
    #[serde(rename = "subscriptionPublication")]
    Publication,
    #[serde(rename = "multicast")]
    Multicast,
    #[serde(rename = "subscriptionRequest")]
    SubscriptionRequest,
    #[serde(rename = "multicastSubscriptionRequest")]
    MulticastSubscriptionRequest,
    #[serde(rename = "broadcastSubscriptionRequest")]
    BroadcastSubscriptionRequest,
    #[serde(rename = "subscriptionReply")]
    SubscriptionReply,
    #[serde(rename = "subscriptionStop")]
    SubscriptionStop,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::OneWay => "oneWay",
            MessageType::Reply => "reply",
            MessageType::Publication => "subscriptionPublication",
            MessageType::Multicast => "multicast",
            MessageType::SubscriptionRequest => "subscriptionRequest",
            MessageType::MulticastSubscriptionRequest => "multicastSubscriptionRequest",
            MessageType::BroadcastSubscriptionRequest => "broadcastSubscriptionRequest",
            MessageType::SubscriptionReply => "subscriptionReply",
            MessageType::SubscriptionStop => "subscriptionStop",
        }
    }

    /// Reply-direction messages never receive a TTL uplift.
    pub fn is_reply_direction(&self) -> bool {
        matches!(self, MessageType::Reply | MessageType::SubscriptionReply)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signs frozen messages on behalf of an owner.
pub trait Keychain: Send + Sync {
    fn owner_id(&self) -> &str;
    fn sign(&self, data: &[u8]) -> Vec<u8>;
}

/// Message under construction. Only the factory creates these.
#[derive(Debug, Clone)]
pub struct MutableMessage {
    id: String,
    message_type: MessageType,
    pub sender: String,
    pub recipient: String,
    pub expiry_date_ms: i64,
    pub reply_to: Option<String>,
    pub effort: Option<MessagingQosEffort>,
    headers: HashMap<String, String>,
    pub payload: String,
    pub local_message: bool,
    pub encrypt: bool,
    pub compress: bool,
}

impl MutableMessage {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            sender: String::new(),
            recipient: String::new(),
            expiry_date_ms: 0,
            reply_to: None,
            effort: None,
            headers: HashMap::new(),
            payload: String::new(),
            local_message: false,
            encrypt: false,
            compress: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Adds a user header unless one with the same key is already present.
    pub fn set_custom_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers
            .entry(format!("{CUSTOM_HEADER_PREFIX}{key}"))
            .or_insert_with(|| value.into());
    }

    pub fn custom_header(&self, key: &str) -> Option<&str> {
        self.header(&format!("{CUSTOM_HEADER_PREFIX}{key}"))
    }

    /// Produces the immutable wire form. Sender and recipient must be set.
    pub fn freeze(self, keychain: Option<&dyn Keychain>) -> Result<ImmutableMessage> {
        if self.sender.is_empty() {
            return Err(Error::InvalidMessage(format!(
                "message {} has no sender",
                self.id
            )));
        }
        if self.recipient.is_empty() {
            return Err(Error::InvalidMessage(format!(
                "message {} has no recipient",
                self.id
            )));
        }

        let mut frozen = ImmutableMessage {
            id: self.id,
            message_type: self.message_type,
            sender: self.sender,
            recipient: self.recipient,
            expiry_date_ms: self.expiry_date_ms,
            reply_to: self.reply_to,
            effort: self.effort,
            headers: self.headers,
            payload: self.payload,
            encrypt: self.encrypt,
            compress: self.compress,
            signer: None,
            signature: None,
            local_message: self.local_message,
            received_from_global: OnceLock::new(),
        };

        if let Some(keychain) = keychain {
            let signature = keychain.sign(&frozen.signing_bytes());
            frozen.signer = Some(keychain.owner_id().to_string());
            frozen.signature = Some(signature);
        }

        Ok(frozen)
    }
}

/// Transport-ready message. Nothing but the received-from-global
/// annotation can change after freezing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmutableMessage {
    id: String,
    #[serde(rename = "type")]
    message_type: MessageType,
    sender: String,
    recipient: String,
    expiry_date_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    effort: Option<MessagingQosEffort>,
    headers: HashMap<String, String>,
    payload: String,
    encrypt: bool,
    compress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<Vec<u8>>,
    #[serde(skip)]
    local_message: bool,
    #[serde(skip)]
    received_from_global: OnceLock<bool>,
}

impl ImmutableMessage {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn expiry_date_ms(&self) -> i64 {
        self.expiry_date_ms
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn effort(&self) -> Option<MessagingQosEffort> {
        self.effort
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn custom_header(&self, key: &str) -> Option<&str> {
        self.header(&format!("{CUSTOM_HEADER_PREFIX}{key}"))
    }

    /// User headers with the namespace prefix stripped.
    pub fn custom_headers(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(CUSTOM_HEADER_PREFIX)
                    .map(|k| (k.to_string(), v.clone()))
            })
            .collect()
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    pub fn is_local_message(&self) -> bool {
        self.local_message
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    pub fn signer(&self) -> Option<&str> {
        self.signer.as_deref()
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_date_ms < now_ms
    }

    /// Records which transport delivered the message. Allowed exactly once.
    pub fn mark_received_from_global(&self, from_global: bool) -> Result<()> {
        self.received_from_global.set(from_global).map_err(|_| {
            Error::InvalidMessage(format!(
                "message {} already carries a received-from-global annotation",
                self.id
            ))
        })
    }

    pub fn is_received_from_global(&self) -> Option<bool> {
        self.received_from_global.get().copied()
    }

    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn signing_bytes(&self) -> Vec<u8> {
        let mut keys: Vec<_> = self.headers.keys().collect();
        keys.sort();
        let mut data = format!(
            "{}|{}|{}|{}|{}",
            self.id, self.message_type, self.sender, self.recipient, self.expiry_date_ms
        );
        for key in keys {
            data.push('|');
            data.push_str(key);
            data.push('=');
            data.push_str(&self.headers[key]);
        }
        data.push('|');
        data.push_str(&self.payload);
        data.into_bytes()
    }
}

impl fmt::Display for ImmutableMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "messageId: {}, type: {}, sender: {}, recipient: {}, expiryDate: {}, payloadLength: {}",
            self.id,
            self.message_type,
            self.sender,
            self.recipient,
            self.expiry_date_ms,
            self.payload.len()
        )
    }
}
