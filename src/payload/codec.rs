use serde::{Deserialize, Serialize};

use crate::payload::types::{
    BroadcastSubscriptionRequest, MulticastPublication, MulticastSubscriptionRequest,
    OneWayRequest, Reply, Request, SubscriptionPublication, SubscriptionReply,
    SubscriptionRequest, SubscriptionStop,
};
use crate::utils::{Error, Result};

/// Every typed operation that can travel inside a message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_typeName")]
pub enum Payload {
    #[serde(rename = "joynr.Request")]
    Request(Request),
    #[serde(rename = "joynr.OneWayRequest")]
    OneWayRequest(OneWayRequest),
    #[serde(rename = "joynr.Reply")]
    Reply(Reply),
    #[serde(rename = "joynr.SubscriptionRequest")]
    SubscriptionRequest(SubscriptionRequest),
    #[serde(rename = "joynr.BroadcastSubscriptionRequest")]
    BroadcastSubscriptionRequest(BroadcastSubscriptionRequest),
    #[serde(rename = "joynr.MulticastSubscriptionRequest")]
    MulticastSubscriptionRequest(MulticastSubscriptionRequest),
    #[serde(rename = "joynr.SubscriptionReply")]
    SubscriptionReply(SubscriptionReply),
    #[serde(rename = "joynr.SubscriptionStop")]
    SubscriptionStop(SubscriptionStop),
    #[serde(rename = "joynr.SubscriptionPublication")]
    SubscriptionPublication(SubscriptionPublication),
    #[serde(rename = "joynr.MulticastPublication")]
    MulticastPublication(MulticastPublication),
}

impl Payload {
    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::Request(_) => "joynr.Request",
            Payload::OneWayRequest(_) => "joynr.OneWayRequest",
            Payload::Reply(_) => "joynr.Reply",
            Payload::SubscriptionRequest(_) => "joynr.SubscriptionRequest",
            Payload::BroadcastSubscriptionRequest(_) => "joynr.BroadcastSubscriptionRequest",
            Payload::MulticastSubscriptionRequest(_) => "joynr.MulticastSubscriptionRequest",
            Payload::SubscriptionReply(_) => "joynr.SubscriptionReply",
            Payload::SubscriptionStop(_) => "joynr.SubscriptionStop",
            Payload::SubscriptionPublication(_) => "joynr.SubscriptionPublication",
            Payload::MulticastPublication(_) => "joynr.MulticastPublication",
        }
    }
}

macro_rules! payload_variant {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$ty(value)
                }
            }

            impl TryFrom<Payload> for $ty {
                type Error = Error;

                fn try_from(payload: Payload) -> Result<Self> {
                    match payload {
                        Payload::$ty(value) => Ok(value),
                        other => Err(Error::InvalidArgument(format!(
                            "expected {} payload, got {}",
                            stringify!($ty),
                            other.type_name()
                        ))),
                    }
                }
            }
        )*
    };
}

payload_variant!(
    Request,
    OneWayRequest,
    Reply,
    SubscriptionRequest,
    BroadcastSubscriptionRequest,
    MulticastSubscriptionRequest,
    SubscriptionReply,
    SubscriptionStop,
    SubscriptionPublication,
    MulticastPublication,
);

/// Converts typed operations to and from the payload text of a message.
pub trait Codec: Send + Sync {
    fn encode(&self, payload: &Payload) -> Result<String>;
    fn decode(&self, data: &str) -> Result<Payload>;
}

/// Decodes `data` and insists on one particular operation type.
pub fn decode_as<T>(codec: &dyn Codec, data: &str) -> Result<T>
where
    T: TryFrom<Payload, Error = Error>,
{
    T::try_from(codec.decode(data)?)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, payload: &Payload) -> Result<String> {
        Ok(serde_json::to_string(payload)?)
    }

    fn decode(&self, data: &str) -> Result<Payload> {
        Ok(serde_json::from_str(data)?)
    }
}
