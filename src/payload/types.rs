use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::payload::qos::SubscriptionQos;
use crate::utils::JoynrException;

/// Name of the attribute getter a poll invokes, `speed` -> `getSpeed`.
pub fn attribute_getter_from_name(attribute_name: &str) -> String {
    let mut chars = attribute_name.chars();
    match chars.next() {
        Some(first) => format!("get{}{}", first.to_uppercase(), chars.as_str()),
        None => "get".to_string(),
    }
}

/// `provider/name[/partition...]`
pub fn create_multicast_id(provider_id: &str, name: &str, partitions: &[String]) -> String {
    let mut id = format!("{provider_id}/{name}");
    for partition in partitions {
        id.push('/');
        id.push_str(partition);
    }
    id
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method_name: String,
    #[serde(default)]
    pub param_datatypes: Vec<String>,
    #[serde(default)]
    pub params: Vec<Value>,
    pub request_reply_id: String,
}

impl Request {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            param_datatypes: Vec::new(),
            params: Vec::new(),
            request_reply_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_param(mut self, datatype: impl Into<String>, value: Value) -> Self {
        self.param_datatypes.push(datatype.into());
        self.params.push(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneWayRequest {
    pub method_name: String,
    #[serde(default)]
    pub param_datatypes: Vec<String>,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl OneWayRequest {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            param_datatypes: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Interpreters only know requests; the reply id is never used.
    pub fn into_request(self) -> Request {
        Request {
            method_name: self.method_name,
            param_datatypes: self.param_datatypes,
            params: self.params,
            request_reply_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response: Vec<Value>,
    pub request_reply_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JoynrException>,
}

impl Reply {
    pub fn success(request_reply_id: impl Into<String>, response: Vec<Value>) -> Self {
        Self {
            response,
            request_reply_id: request_reply_id.into(),
            error: None,
        }
    }

    pub fn failure(request_reply_id: impl Into<String>, error: JoynrException) -> Self {
        Self {
            response: Vec::new(),
            request_reply_id: request_reply_id.into(),
            error: Some(error),
        }
    }
}

/// Attribute subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub subscription_id: String,
    pub subscribed_to_name: String,
    pub qos: SubscriptionQos,
}

impl SubscriptionRequest {
    pub fn new(subscribed_to_name: impl Into<String>, qos: SubscriptionQos) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), subscribed_to_name, qos)
    }

    pub fn with_id(
        subscription_id: impl Into<String>,
        subscribed_to_name: impl Into<String>,
        qos: SubscriptionQos,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            subscribed_to_name: subscribed_to_name.into(),
            qos,
        }
    }
}

/// Filter name to filter value.
pub type BroadcastFilterParameters = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastSubscriptionRequest {
    pub subscription_id: String,
    pub subscribed_to_name: String,
    pub qos: SubscriptionQos,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_parameters: Option<BroadcastFilterParameters>,
}

impl BroadcastSubscriptionRequest {
    pub fn new(subscribed_to_name: impl Into<String>, qos: SubscriptionQos) -> Self {
        Self {
            subscription_id: Uuid::new_v4().to_string(),
            subscribed_to_name: subscribed_to_name.into(),
            qos,
            filter_parameters: None,
        }
    }

    pub fn with_filter_parameters(mut self, filter_parameters: BroadcastFilterParameters) -> Self {
        self.filter_parameters = Some(filter_parameters);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastSubscriptionRequest {
    pub subscription_id: String,
    pub subscribed_to_name: String,
    pub qos: SubscriptionQos,
    pub multicast_id: String,
}

impl MulticastSubscriptionRequest {
    pub fn new(
        provider_id: &str,
        subscribed_to_name: impl Into<String>,
        partitions: &[String],
        qos: SubscriptionQos,
    ) -> Self {
        let subscribed_to_name = subscribed_to_name.into();
        Self {
            subscription_id: Uuid::new_v4().to_string(),
            multicast_id: create_multicast_id(provider_id, &subscribed_to_name, partitions),
            subscribed_to_name,
            qos,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionReply {
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JoynrException>,
}

impl SubscriptionReply {
    pub fn success(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            error: None,
        }
    }

    pub fn failure(subscription_id: impl Into<String>, error: JoynrException) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStop {
    pub subscription_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPublication {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response: Vec<Value>,
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JoynrException>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastPublication {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response: Vec<Value>,
    pub multicast_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JoynrException>,
}

/// Value or error delivered to a consumer-side subscription callback.
pub type PublicationResult = Result<Vec<Value>, JoynrException>;

impl SubscriptionPublication {
    pub fn into_result(self) -> PublicationResult {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.response),
        }
    }
}

impl MulticastPublication {
    pub fn into_result(self) -> PublicationResult {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.response),
        }
    }
}

/// Request plus the proxy/provider pair it travels between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInformation<R> {
    pub proxy_participant_id: String,
    pub provider_participant_id: String,
    pub request: R,
}

pub type SubscriptionRequestInformation = RequestInformation<SubscriptionRequest>;
pub type BroadcastSubscriptionRequestInformation = RequestInformation<BroadcastSubscriptionRequest>;

impl<R> RequestInformation<R> {
    pub fn new(proxy_participant_id: &str, provider_participant_id: &str, request: R) -> Self {
        Self {
            proxy_participant_id: proxy_participant_id.to_string(),
            provider_participant_id: provider_participant_id.to_string(),
            request,
        }
    }
}

/// Common view over attribute and broadcast subscription requests.
pub trait SubscriptionRequestLike {
    fn subscription_id(&self) -> &str;
    fn subscribed_to_name(&self) -> &str;
    fn qos(&self) -> &SubscriptionQos;
}

impl SubscriptionRequestLike for SubscriptionRequest {
    fn subscription_id(&self) -> &str {
        &self.subscription_id
    }
    fn subscribed_to_name(&self) -> &str {
        &self.subscribed_to_name
    }
    fn qos(&self) -> &SubscriptionQos {
        &self.qos
    }
}

impl SubscriptionRequestLike for BroadcastSubscriptionRequest {
    fn subscription_id(&self) -> &str {
        &self.subscription_id
    }
    fn subscribed_to_name(&self) -> &str {
        &self.subscribed_to_name
    }
    fn qos(&self) -> &SubscriptionQos {
        &self.qos
    }
}

impl<R: SubscriptionRequestLike> RequestInformation<R> {
    pub fn subscription_id(&self) -> &str {
        self.request.subscription_id()
    }

    pub fn qos(&self) -> &SubscriptionQos {
        self.request.qos()
    }

    pub fn subscribed_to_name(&self) -> &str {
        self.request.subscribed_to_name()
    }
}
