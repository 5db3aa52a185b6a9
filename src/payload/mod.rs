//! Typed operations carried inside message payloads and the codec that
//! turns them into payload text.

pub mod codec;
pub mod qos;
pub mod types;

pub use codec::{Codec, JsonCodec, Payload, decode_as};
pub use qos::{DEFAULT_PUBLICATION_TTL_MS, NO_EXPIRY_DATE, QosKind, SubscriptionQos};
pub use types::{
    BroadcastFilterParameters, BroadcastSubscriptionRequest,
    BroadcastSubscriptionRequestInformation, MulticastPublication, MulticastSubscriptionRequest,
    OneWayRequest, PublicationResult, Reply, Request, RequestInformation, SubscriptionPublication,
    SubscriptionReply, SubscriptionRequest, SubscriptionRequestInformation,
    SubscriptionRequestLike, SubscriptionStop, attribute_getter_from_name, create_multicast_id,
};
