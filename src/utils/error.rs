//! The `error` module defines the error types used within `switchyard`.
//!
//! Two families live here:
//!
//! - [`Error`] is the crate-local error returned from fallible operations
//!   (building messages, handing them to a router, touching the store).
//! - [`JoynrException`] is the serializable error value that travels inside
//!   replies and publications. It never crosses the dispatch loop as a Rust
//!   error; it is always embedded in a message payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the messaging core.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input, including payloads that fail to encode or decode.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A request-class send could not even be attempted.
    #[error("method invocation failed: {0}")]
    MethodInvocation(String),

    /// The message router rejected or could not deliver a message.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A message is incomplete or was annotated twice.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The durable store failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The component is shutting down and rejected the call.
    #[error("{0} is shutting down")]
    Shutdown(&'static str),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error value carried inside `Reply`, `SubscriptionReply` and publications.
///
/// Tagged by `_typeName` with the joynr exception names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "_typeName")]
pub enum JoynrException {
    #[serde(rename = "joynr.exceptions.JoynrRuntimeException")]
    #[error("runtime exception: {detail_message}")]
    Runtime {
        #[serde(rename = "detailMessage")]
        detail_message: String,
    },

    #[serde(rename = "joynr.exceptions.ProviderRuntimeException")]
    #[error("provider runtime exception: {detail_message}")]
    ProviderRuntime {
        #[serde(rename = "detailMessage")]
        detail_message: String,
    },

    #[serde(rename = "joynr.exceptions.MethodInvocationException")]
    #[error("method invocation exception: {detail_message}")]
    MethodInvocation {
        #[serde(rename = "detailMessage")]
        detail_message: String,
    },

    #[serde(rename = "joynr.exceptions.SubscriptionException")]
    #[error("subscription exception for {subscription_id}: {detail_message}")]
    Subscription {
        #[serde(rename = "detailMessage")]
        detail_message: String,
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
    },

    #[serde(rename = "joynr.exceptions.PublicationMissedException")]
    #[error("publication missed for {subscription_id}")]
    PublicationMissed {
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
    },

    /// Modelled error declared by the interface, never logged as a failure.
    #[serde(rename = "joynr.exceptions.ApplicationException")]
    #[error("application exception {error}: {detail_message}")]
    Application {
        error: String,
        #[serde(rename = "detailMessage")]
        detail_message: String,
    },
}

impl JoynrException {
    pub fn provider_runtime(detail: impl Into<String>) -> Self {
        JoynrException::ProviderRuntime {
            detail_message: detail.into(),
        }
    }

    pub fn method_invocation(detail: impl Into<String>) -> Self {
        JoynrException::MethodInvocation {
            detail_message: detail.into(),
        }
    }

    pub fn subscription(detail: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        JoynrException::Subscription {
            detail_message: detail.into(),
            subscription_id: subscription_id.into(),
        }
    }

    pub fn is_application(&self) -> bool {
        matches!(self, JoynrException::Application { .. })
    }
}
