use std::sync::{Arc, Mutex};

use serde_json::json;

use super::*;

#[derive(Default)]
struct Collector {
    replies: Mutex<Vec<SubscriptionReply>>,
    publications: Mutex<Vec<PublicationResult>>,
}

impl SubscriptionCallback for Collector {
    fn on_subscription_reply(&self, reply: SubscriptionReply) {
        self.replies.lock().unwrap().push(reply);
    }

    fn on_publication(&self, publication: PublicationResult) {
        self.publications.lock().unwrap().push(publication);
    }
}

#[test]
fn test_multicast_pattern_matching() {
    assert!(multicast_id_matches("p/weather", "p/weather"));
    assert!(!multicast_id_matches("p/weather", "p/weather/eu"));
    assert!(multicast_id_matches("p/weather/+", "p/weather/eu"));
    assert!(!multicast_id_matches("p/weather/+", "p/weather"));
    assert!(multicast_id_matches("p/weather/+/de", "p/weather/eu/de"));
    assert!(!multicast_id_matches("p/weather/+/de", "p/weather/eu/fr"));
    assert!(multicast_id_matches("p/weather/*", "p/weather"));
    assert!(multicast_id_matches("p/weather/*", "p/weather/eu/de"));
    assert!(!multicast_id_matches("p/news/*", "p/weather/eu"));
}

#[test]
fn test_unicast_callback_lookup_and_touch() {
    let directory = SubscriptionDirectory::new();
    let collector = Arc::new(Collector::default());
    directory.register_subscription("sub-1", collector.clone());

    assert!(directory.subscription_callback("sub-2").is_none());
    assert_eq!(directory.last_publication_ms("sub-1"), None);

    directory.touch_subscription_state("sub-1");
    assert!(directory.last_publication_ms("sub-1").is_some());

    directory
        .subscription_callback("sub-1")
        .unwrap()
        .on_publication(Ok(vec![json!(1)]));
    assert_eq!(collector.publications.lock().unwrap().len(), 1);

    assert!(directory.unregister_subscription("sub-1"));
    assert!(directory.subscription_callback("sub-1").is_none());
}

#[test]
fn test_multicast_callbacks_by_pattern() {
    let directory = SubscriptionDirectory::new();
    directory.register_multicast_subscription("a", "p/weather/+", Arc::new(Collector::default()));
    directory.register_multicast_subscription("b", "p/weather/*", Arc::new(Collector::default()));
    directory.register_subscription("c", Arc::new(Collector::default()));

    assert_eq!(directory.multicast_callbacks("p/weather/eu").len(), 2);
    assert_eq!(directory.multicast_callbacks("p/weather/eu/de").len(), 1);
    assert!(directory.multicast_callbacks("p/news").is_empty());

    // Multicast subscriptions still get their subscription reply by id.
    assert!(directory.subscription_callback("a").is_some());
}
