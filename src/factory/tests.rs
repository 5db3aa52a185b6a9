use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::payload::{JsonCodec, SubscriptionQos, decode_as};
use crate::utils::time::{MAX_TIME_MS, now_ms};

const UPLIFT_MS: u64 = 10_000;
const TOLERANCE_MS: i64 = 200;

fn factory(uplift: u64) -> MessageFactory {
    MessageFactory::new(uplift, Arc::new(JsonCodec))
}

fn assert_expiry_near(actual: i64, expected: i64) {
    assert!(
        (actual - expected).abs() <= TOLERANCE_MS,
        "expiry {actual} not within {TOLERANCE_MS}ms of {expected}"
    );
}

#[test]
fn test_request_message_shape() {
    let mut request = Request::new("getTrue");
    request.request_reply_id = "rr-42".to_string();

    let msg = factory(0)
        .create_request("proxy", "provider", &MessagingQos::default(), request, false)
        .unwrap();

    assert_eq!(msg.message_type(), MessageType::Request);
    assert_eq!(msg.sender, "proxy");
    assert_eq!(msg.recipient, "provider");
    assert_eq!(msg.header(HEADER_REQUEST_REPLY_ID), Some("rr-42"));
    assert_eq!(
        msg.payload,
        r#"{"_typeName":"joynr.Request","methodName":"getTrue","paramDatatypes":[],"params":[],"requestReplyId":"rr-42"}"#
    );
}

#[test]
fn test_forward_messages_receive_uplift() {
    let f = factory(UPLIFT_MS);
    let qos = MessagingQos::with_ttl(1_000);
    let expected = now_ms() + 1_000 + UPLIFT_MS as i64;

    let request = f
        .create_request("a", "b", &qos, Request::new("m"), false)
        .unwrap();
    assert_expiry_near(request.expiry_date_ms, expected);

    let one_way = f
        .create_one_way_request("a", "b", &qos, OneWayRequest::new("m"), false)
        .unwrap();
    assert_expiry_near(one_way.expiry_date_ms, expected);

    let stop = f
        .create_subscription_stop(
            "a",
            "b",
            &qos,
            SubscriptionStop {
                subscription_id: "s".to_string(),
            },
            false,
        )
        .unwrap();
    assert_expiry_near(stop.expiry_date_ms, expected);

    let publication = f
        .create_subscription_publication(
            "a",
            "b",
            &qos,
            SubscriptionPublication {
                response: vec![json!(1)],
                subscription_id: "s".to_string(),
                error: None,
            },
            false,
        )
        .unwrap();
    assert_expiry_near(publication.expiry_date_ms, expected);
}

#[test]
fn test_replies_never_receive_uplift() {
    let f = factory(UPLIFT_MS);
    let qos = MessagingQos::with_ttl(1_000);
    let expected = now_ms() + 1_000;

    let reply = f
        .create_reply("a", "b", &qos, Reply::success("rr", vec![]), false)
        .unwrap();
    assert_expiry_near(reply.expiry_date_ms, expected);

    let subscription_reply = f
        .create_subscription_reply("a", "b", &qos, SubscriptionReply::success("s"), false)
        .unwrap();
    assert_expiry_near(subscription_reply.expiry_date_ms, expected);
}

#[test]
fn test_overflowing_ttl_saturates() {
    let qos = MessagingQos::with_ttl(i64::MAX as u64);
    let msg = factory(UPLIFT_MS)
        .create_request("a", "b", &qos, Request::new("m"), false)
        .unwrap();
    assert_eq!(msg.expiry_date_ms, MAX_TIME_MS);

    let reply = factory(UPLIFT_MS)
        .create_reply("a", "b", &qos, Reply::success("rr", vec![]), false)
        .unwrap();
    assert_eq!(reply.expiry_date_ms, MAX_TIME_MS);
}

#[test]
fn test_qos_hints_and_custom_headers_are_copied() {
    let mut qos = MessagingQos::with_ttl(1_000);
    qos.encrypt = true;
    qos.compress = true;
    qos.effort = Some(crate::message::MessagingQosEffort::BestEffort);
    qos.put_custom_header("trace", "abc");

    let request = SubscriptionRequest::with_id("sub-7", "speed", SubscriptionQos::on_change(0));
    let msg = factory(0)
        .create_subscription_request("a", "b", &qos, request, true)
        .unwrap();

    assert!(msg.encrypt);
    assert!(msg.compress);
    assert!(msg.local_message);
    assert_eq!(
        msg.effort,
        Some(crate::message::MessagingQosEffort::BestEffort)
    );
    assert_eq!(msg.custom_header("trace"), Some("abc"));
    assert_eq!(msg.header(HEADER_SUBSCRIPTION_ID), Some("sub-7"));
}

#[test]
fn test_multicast_recipient_is_multicast_id() {
    let publication = MulticastPublication {
        response: vec![json!("rain")],
        multicast_id: "prov/weather/eu".to_string(),
        error: None,
    };
    let msg = factory(0)
        .create_multicast_publication("prov", &MessagingQos::default(), publication)
        .unwrap();
    assert_eq!(msg.message_type(), MessageType::Multicast);
    assert_eq!(msg.recipient, "prov/weather/eu");
}

#[test]
fn test_freeze_signs_with_keychain() {
    struct StaticKeychain;
    impl Keychain for StaticKeychain {
        fn owner_id(&self) -> &str {
            "runtime"
        }
        fn sign(&self, _data: &[u8]) -> Vec<u8> {
            vec![1, 2, 3]
        }
    }

    let f = factory(0).with_keychain(Arc::new(StaticKeychain));
    let msg = f
        .create_request("a", "b", &MessagingQos::default(), Request::new("m"), false)
        .unwrap();
    let frozen = f.freeze(msg).unwrap();
    assert_eq!(frozen.signer(), Some("runtime"));
    assert_eq!(frozen.signature(), Some(&[1u8, 2, 3][..]));

    let decoded: Request = decode_as(&JsonCodec, frozen.payload()).unwrap();
    assert_eq!(decoded.method_name, "m");
}

#[test]
fn test_reply_direction_messages_carry_local_flag() {
    let f = factory(0);
    let qos = MessagingQos::default();

    let reply = f
        .create_reply("provider", "proxy", &qos, Reply::success("rr", vec![]), true)
        .unwrap();
    assert!(reply.local_message);

    let subscription_reply = f
        .create_subscription_reply("provider", "proxy", &qos, SubscriptionReply::success("s"), true)
        .unwrap();
    assert!(subscription_reply.local_message);

    let publication = SubscriptionPublication {
        response: vec![json!(1)],
        subscription_id: "s".to_string(),
        error: None,
    };
    let remote = f
        .create_subscription_publication("provider", "proxy", &qos, publication.clone(), false)
        .unwrap();
    assert!(!remote.local_message);
    let local = f
        .create_subscription_publication("provider", "proxy", &qos, publication, true)
        .unwrap();
    assert!(f.freeze(local).unwrap().is_local_message());
}
