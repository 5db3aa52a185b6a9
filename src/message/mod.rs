//! The `message` module defines the envelope exchanged between participants.
//!
//! A [`MutableMessage`] is built by the factory and frozen exactly once into
//! an [`ImmutableMessage`], the form handed to a router. The payload is an
//! opaque string produced by a codec.

#[allow(clippy::module_inception)]
pub mod message;
pub mod qos;

pub use message::{
    CUSTOM_HEADER_PREFIX, HEADER_REQUEST_REPLY_ID, HEADER_SUBSCRIPTION_ID, ImmutableMessage,
    Keychain, MessageType, MutableMessage,
};
pub use qos::{MessagingQos, MessagingQosEffort};
