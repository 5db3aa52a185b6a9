use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::tempdir;

use super::*;
use crate::config::Settings;
use crate::message::MessagingQos;
use crate::payload::{
    BroadcastFilterParameters, BroadcastSubscriptionRequest, MulticastPublication,
    MulticastSubscriptionRequest, Request, SubscriptionPublication, SubscriptionQos,
    SubscriptionReply, SubscriptionRequest,
};
use crate::persistence::{SledStore, SubscriptionStore};
use crate::provider::{
    AttributeListener, BroadcastFilter, BroadcastListener, InterpreterRegistry, ListenerRegistry,
    OnError, OnSuccess, RequestCaller, RequestInterpreter,
};
use crate::sender::PublicationSender;
use crate::utils::JoynrException;
use crate::utils::time::now_ms;

const PROXY: &str = "proxy";
const PROVIDER: &str = "provider";

#[derive(Default)]
struct RecordingSender {
    replies: Mutex<Vec<(MessagingQos, SubscriptionReply)>>,
    publications: Mutex<Vec<(MessagingQos, SubscriptionPublication)>>,
    multicasts: Mutex<Vec<(String, MulticastPublication)>>,
}

impl RecordingSender {
    fn replies(&self) -> Vec<SubscriptionReply> {
        self.replies.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    fn publications(&self) -> Vec<SubscriptionPublication> {
        self.publications.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    fn publication_count(&self) -> usize {
        self.publications.lock().unwrap().len()
    }
}

impl PublicationSender for RecordingSender {
    fn send_subscription_reply(&self, sender_id: &str, receiver_id: &str, qos: &MessagingQos, reply: SubscriptionReply) {
        assert_eq!((sender_id, receiver_id), (PROVIDER, PROXY));
        self.replies.lock().unwrap().push((qos.clone(), reply));
    }

    fn send_subscription_publication(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        publication: SubscriptionPublication,
    ) {
        assert_eq!((sender_id, receiver_id), (PROVIDER, PROXY));
        self.publications.lock().unwrap().push((qos.clone(), publication));
    }

    fn send_multicast(&self, sender_id: &str, _qos: &MessagingQos, publication: MulticastPublication) {
        self.multicasts.lock().unwrap().push((sender_id.to_string(), publication));
    }
}

/// Provider with a readable `speed` attribute, a failing `broken`
/// attribute and a `fired` broadcast.
#[derive(Default)]
struct SpeedProvider {
    listeners: ListenerRegistry,
    speed: Mutex<Value>,
    getter_calls: AtomicUsize,
}

impl SpeedProvider {
    fn set_speed(&self, speed: Value) {
        *self.speed.lock().unwrap() = speed.clone();
        self.listeners.attribute_value_changed("speed", speed);
    }
}

impl RequestCaller for SpeedProvider {
    fn interface_name(&self) -> &str {
        "vehicle/Speed"
    }
    fn major_version(&self) -> u32 {
        1
    }
    fn register_attribute_listener(&self, attribute_name: &str, listener: Arc<dyn AttributeListener>) {
        self.listeners.add_attribute_listener(attribute_name, listener);
    }
    fn unregister_attribute_listener(&self, attribute_name: &str, listener: &Arc<dyn AttributeListener>) {
        self.listeners.remove_attribute_listener(attribute_name, listener);
    }
    fn register_broadcast_listener(&self, broadcast_name: &str, listener: Arc<dyn BroadcastListener>) {
        self.listeners.add_broadcast_listener(broadcast_name, listener);
    }
    fn unregister_broadcast_listener(&self, broadcast_name: &str, listener: &Arc<dyn BroadcastListener>) {
        self.listeners.remove_broadcast_listener(broadcast_name, listener);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SpeedInterpreter;

impl RequestInterpreter for SpeedInterpreter {
    fn execute(&self, caller: Arc<dyn RequestCaller>, request: Request, on_success: OnSuccess, on_error: OnError) {
        let Some(provider) = caller.as_any().downcast_ref::<SpeedProvider>() else {
            on_error(JoynrException::provider_runtime("unexpected caller"));
            return;
        };
        provider.getter_calls.fetch_add(1, Ordering::SeqCst);
        match request.method_name.as_str() {
            "getSpeed" => on_success(vec![provider.speed.lock().unwrap().clone()]),
            other => on_error(JoynrException::method_invocation(format!("unknown method {other}"))),
        }
    }
}

/// Forwards a broadcast only if its first value equals the `country` filter parameter.
struct CountryFilter;

impl BroadcastFilter for CountryFilter {
    fn filter_forward(&self, values: &[Value], filter_parameters: &BroadcastFilterParameters) -> bool {
        match (values.first(), filter_parameters.get("country")) {
            (Some(Value::String(value)), Some(country)) => value == country,
            _ => false,
        }
    }
}

struct Fixture {
    manager: Arc<PublicationManager>,
    sender: Arc<RecordingSender>,
    provider: Arc<SpeedProvider>,
}

impl Fixture {
    fn caller(&self) -> Arc<dyn RequestCaller> {
        self.provider.clone()
    }

    fn weak_sender(&self) -> Weak<dyn PublicationSender> {
        let sender: Arc<dyn PublicationSender> = self.sender.clone();
        Arc::downgrade(&sender)
    }

    fn subscribe(&self, request: SubscriptionRequest) {
        self.manager
            .add_attribute_subscription(PROXY, PROVIDER, self.caller(), request, self.weak_sender());
    }

    fn subscribe_broadcast(&self, request: BroadcastSubscriptionRequest) {
        self.manager
            .add_broadcast_subscription(PROXY, PROVIDER, self.caller(), request, self.weak_sender());
    }
}

fn fixture_with(settings: Settings, store: Option<Arc<dyn SubscriptionStore>>) -> Fixture {
    let interpreters = Arc::new(InterpreterRegistry::new());
    interpreters.register("vehicle/Speed", 1, Arc::new(SpeedInterpreter));
    let sender = Arc::new(RecordingSender::default());
    let multicast_sender: Arc<dyn PublicationSender> = sender.clone();

    let manager = PublicationManager::new(&settings, interpreters, store, Arc::downgrade(&multicast_sender));
    let provider = Arc::new(SpeedProvider::default());
    *provider.speed.lock().unwrap() = json!(0);
    Fixture {
        manager,
        sender,
        provider,
    }
}

fn fixture() -> Fixture {
    fixture_with(Settings::default(), None)
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test]
async fn test_subscription_with_past_expiry_is_rejected() {
    let f = fixture();
    let qos = SubscriptionQos::on_change(0).with_expiry_date_ms(now_ms() - 1_000);
    f.subscribe(SubscriptionRequest::with_id("late", "speed", qos));

    let replies = f.sender.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(
        replies[0].error,
        Some(JoynrException::subscription(PUBLICATION_END_IN_PAST, "late"))
    );
    let (reply_qos, _) = f.sender.replies.lock().unwrap()[0].clone();
    assert!(reply_qos.ttl_ms > 59_000);

    settle(50).await;
    assert!(!f.manager.publication_exists("late"));
    assert_eq!(f.sender.publication_count(), 0);
    assert_eq!(f.provider.listeners.attribute_listener_count("speed"), 0);
}

#[tokio::test]
async fn test_attribute_subscription_replies_and_publishes_initial_value() {
    let f = fixture();
    f.provider.set_speed(json!(42));
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", SubscriptionQos::on_change(0)));

    let replies = f.sender.replies.lock().unwrap().clone();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].1, SubscriptionReply::success("s1"));
    assert_eq!(replies[0].0.ttl_ms, i64::MAX as u64);

    settle(50).await;
    let publications = f.sender.publications();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].subscription_id, "s1");
    assert_eq!(publications[0].response, vec![json!(42)]);
    assert!(f.manager.publication_exists("s1"));
}

#[tokio::test]
async fn test_publication_uses_publication_ttl() {
    let f = fixture();
    let qos = SubscriptionQos::on_change(0).with_publication_ttl_ms(2_500);
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", qos));
    settle(50).await;

    let (qos, _) = f.sender.publications.lock().unwrap()[0].clone();
    assert_eq!(qos.ttl_ms, 2_500);
}

#[tokio::test]
async fn test_change_without_min_interval_publishes_immediately() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", SubscriptionQos::on_change(0)));
    settle(50).await;

    f.provider.set_speed(json!(7));
    let publications = f.sender.publications();
    assert_eq!(publications.len(), 2);
    assert_eq!(publications[1].response, vec![json!(7)]);
}

#[tokio::test]
async fn test_changes_within_min_interval_are_coalesced() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", SubscriptionQos::on_change(300)));
    settle(50).await;
    assert_eq!(f.sender.publication_count(), 1);

    f.provider.set_speed(json!(1));
    f.provider.set_speed(json!(2));
    f.provider.set_speed(json!(3));
    assert_eq!(f.sender.publication_count(), 1);

    settle(450).await;
    let publications = f.sender.publications();
    assert_eq!(publications.len(), 2);
    assert_eq!(publications[1].response, vec![json!(3)]);
}

#[tokio::test]
async fn test_periodic_subscription_polls_until_stopped() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("tick", "speed", SubscriptionQos::periodic(100)));
    settle(350).await;
    let polled = f.sender.publication_count();
    assert!(polled >= 3, "expected at least 3 publications, got {polled}");

    f.manager.stop_publication("tick");
    let after_stop = f.sender.publication_count();
    settle(250).await;
    assert_eq!(f.sender.publication_count(), after_stop);
    assert!(!f.manager.publication_exists("tick"));
}

#[tokio::test]
async fn test_failing_getter_publishes_error() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s1", "broken", SubscriptionQos::on_change(0)));
    settle(50).await;

    let publications = f.sender.publications();
    assert_eq!(publications.len(), 1);
    assert!(matches!(
        publications[0].error,
        Some(JoynrException::MethodInvocation { .. })
    ));
}

#[tokio::test]
async fn test_publication_ends_at_expiry() {
    let f = fixture();
    let qos = SubscriptionQos::on_change(0).with_validity_ms(150);
    f.subscribe(SubscriptionRequest::with_id("short", "speed", qos));
    assert_eq!(f.provider.listeners.attribute_listener_count("speed"), 1);

    settle(350).await;
    assert!(!f.manager.publication_exists("short"));
    assert_eq!(f.provider.listeners.attribute_listener_count("speed"), 0);
}

#[tokio::test]
async fn test_publication_end_includes_ttl_uplift() {
    let mut settings = Settings::default();
    settings.messaging.ttl_uplift_ms = 400;
    let f = fixture_with(settings, None);
    let qos = SubscriptionQos::on_change(0).with_validity_ms(100);
    f.subscribe(SubscriptionRequest::with_id("uplifted", "speed", qos));

    settle(250).await;
    assert!(f.manager.publication_exists("uplifted"));
    settle(500).await;
    assert!(!f.manager.publication_exists("uplifted"));
}

#[tokio::test]
async fn test_resubscribing_replaces_the_publication() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", SubscriptionQos::on_change(0)));
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", SubscriptionQos::on_change(0)));
    settle(50).await;

    assert_eq!(f.provider.listeners.attribute_listener_count("speed"), 1);
    assert_eq!(f.sender.replies().len(), 2);

    f.provider.set_speed(json!(9));
    let changes = f
        .sender
        .publications()
        .into_iter()
        .filter(|p| p.response == vec![json!(9)])
        .count();
    assert_eq!(changes, 1);
}

#[tokio::test]
async fn test_poll_of_stopped_subscription_does_not_reach_its_replacement() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s", "speed", SubscriptionQos::periodic(100)));
    settle(30).await;
    assert_eq!(f.sender.publication_count(), 1);

    f.manager.stop_publication("s");
    f.subscribe(SubscriptionRequest::with_id("s", "speed", SubscriptionQos::on_change(0)));
    settle(30).await;
    assert_eq!(f.sender.publication_count(), 2);

    settle(200).await;
    assert_eq!(f.sender.publication_count(), 2);
    assert_eq!(f.provider.getter_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resubscribing_periodic_keeps_a_single_poll_chain() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s", "speed", SubscriptionQos::periodic(100)));
    settle(30).await;
    f.subscribe(SubscriptionRequest::with_id("s", "speed", SubscriptionQos::periodic(100)));
    settle(330).await;

    // Initial polls of both requests, then one poll per period.
    let published = f.sender.publication_count();
    assert!((4..=6).contains(&published), "expected a single poll chain, got {published} publications");
}

#[tokio::test]
async fn test_stop_publication_is_idempotent() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", SubscriptionQos::on_change(0)));

    f.manager.stop_publication("s1");
    f.manager.stop_publication("s1");
    f.manager.stop_publication("unknown");

    assert!(!f.manager.publication_exists("s1"));
    assert_eq!(f.provider.listeners.attribute_listener_count("speed"), 0);
}

#[tokio::test]
async fn test_queued_subscriptions_are_restored_in_arrival_order() {
    let f = fixture();
    for id in ["a", "b", "c"] {
        let request = SubscriptionRequest::with_id(id, "speed", SubscriptionQos::on_change(0));
        f.manager.add_queued_attribute_subscription(PROXY, PROVIDER, request);
    }
    assert_eq!(f.manager.queued_subscription_ids(PROVIDER), vec!["a", "b", "c"]);
    assert!(f.sender.replies().is_empty());

    f.manager.restore(PROVIDER, f.caller(), f.weak_sender());

    let order: Vec<String> = f.sender.replies().into_iter().map(|r| r.subscription_id).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert!(f.manager.queued_subscription_ids(PROVIDER).is_empty());
    assert!(f.manager.publication_exists("b"));
}

#[tokio::test]
async fn test_restore_drops_expired_queued_subscriptions() {
    let f = fixture();
    let qos = SubscriptionQos::on_change(0).with_validity_ms(30);
    let request = SubscriptionRequest::with_id("stale", "speed", qos);
    f.manager.add_queued_attribute_subscription(PROXY, PROVIDER, request);
    settle(80).await;

    f.manager.restore(PROVIDER, f.caller(), f.weak_sender());
    assert!(f.sender.replies().is_empty());
    assert!(!f.manager.publication_exists("stale"));
}

#[tokio::test]
async fn test_restore_ignores_other_providers() {
    let f = fixture();
    let request = SubscriptionRequest::with_id("elsewhere", "speed", SubscriptionQos::on_change(0));
    f.manager.add_queued_attribute_subscription(PROXY, "other-provider", request);

    f.manager.restore(PROVIDER, f.caller(), f.weak_sender());
    assert_eq!(f.manager.queued_subscription_ids("other-provider"), vec!["elsewhere"]);
}

#[tokio::test]
async fn test_stopping_a_queued_subscription_removes_it_from_the_queue() {
    let f = fixture();
    let request = SubscriptionRequest::with_id("q1", "speed", SubscriptionQos::on_change(0));
    f.manager.add_queued_attribute_subscription(PROXY, PROVIDER, request);

    f.manager.stop_publication("q1");
    f.manager.restore(PROVIDER, f.caller(), f.weak_sender());

    assert!(f.sender.replies().is_empty());
    assert!(!f.manager.publication_exists("q1"));
}

#[tokio::test]
async fn test_remove_all_subscriptions_of_provider() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("s1", "speed", SubscriptionQos::on_change(0)));
    let mut broadcast = BroadcastSubscriptionRequest::new("fired", SubscriptionQos::on_change(0));
    broadcast.subscription_id = "b1".to_string();
    f.subscribe_broadcast(broadcast);
    let queued = SubscriptionRequest::with_id("q1", "speed", SubscriptionQos::on_change(0));
    f.manager.add_queued_attribute_subscription(PROXY, "other-provider", queued);

    f.manager.remove_all_subscriptions(PROVIDER);

    assert!(!f.manager.publication_exists("s1"));
    assert!(!f.manager.publication_exists("b1"));
    assert_eq!(f.provider.listeners.attribute_listener_count("speed"), 0);
    assert_eq!(f.provider.listeners.broadcast_listener_count("fired"), 0);
    assert_eq!(f.manager.queued_subscription_ids("other-provider"), vec!["q1"]);
}

#[tokio::test]
async fn test_broadcast_is_published_through_filters() {
    let f = fixture();
    f.provider.listeners.add_broadcast_filter("fired", Arc::new(CountryFilter));
    let mut parameters = BroadcastFilterParameters::new();
    parameters.insert("country".to_string(), "de".to_string());
    let mut request = BroadcastSubscriptionRequest::new("fired", SubscriptionQos::on_change(0))
        .with_filter_parameters(parameters);
    request.subscription_id = "b1".to_string();
    f.subscribe_broadcast(request);

    f.provider.listeners.fire_selective_broadcast("fired", &[json!("fr")]);
    f.provider.listeners.fire_selective_broadcast("fired", &[json!("de")]);

    let publications = f.sender.publications();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].response, vec![json!("de")]);
}

#[tokio::test]
async fn test_broadcast_within_min_interval_is_omitted() {
    let f = fixture();
    let mut request = BroadcastSubscriptionRequest::new("fired", SubscriptionQos::on_change(500));
    request.subscription_id = "b1".to_string();
    f.subscribe_broadcast(request);

    f.provider.listeners.fire_broadcast("fired", &[json!(1)]);
    f.provider.listeners.fire_broadcast("fired", &[json!(2)]);

    let publications = f.sender.publications();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].response, vec![json!(1)]);
}

#[tokio::test]
async fn test_multicast_subscription_is_acknowledged() {
    let f = fixture();
    let request = MulticastSubscriptionRequest::new(PROVIDER, "fired", &[], SubscriptionQos::multicast());
    let subscription_id = request.subscription_id.clone();
    f.manager
        .add_multicast_subscription(PROXY, PROVIDER, request, f.weak_sender());

    assert_eq!(f.sender.replies(), vec![SubscriptionReply::success(subscription_id)]);
}

#[tokio::test]
async fn test_multicast_occurred_sends_multicast_publication() {
    let f = fixture();
    f.manager
        .multicast_occurred(PROVIDER, "fired", &["eu".to_string()], vec![json!(true)]);

    let multicasts = f.sender.multicasts.lock().unwrap().clone();
    assert_eq!(multicasts.len(), 1);
    assert_eq!(multicasts[0].0, PROVIDER);
    assert_eq!(multicasts[0].1.multicast_id, "provider/fired/eu");
    assert_eq!(multicasts[0].1.response, vec![json!(true)]);
}

#[tokio::test]
async fn test_subscriptions_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("subscriptions");
    let store: Arc<dyn SubscriptionStore> = Arc::new(SledStore::open(path.to_str().unwrap()).unwrap());

    {
        let f = fixture_with(Settings::default(), Some(store.clone()));
        f.subscribe(SubscriptionRequest::with_id("active", "speed", SubscriptionQos::on_change(0)));
        let queued = SubscriptionRequest::with_id("queued", "speed", SubscriptionQos::on_change(0));
        f.manager.add_queued_attribute_subscription(PROXY, PROVIDER, queued);
        let short = SubscriptionQos::on_change(0).with_validity_ms(60_000);
        let mut broadcast = BroadcastSubscriptionRequest::new("fired", short);
        broadcast.subscription_id = "b1".to_string();
        f.subscribe_broadcast(broadcast);
        let stopped = SubscriptionRequest::with_id("stopped", "speed", SubscriptionQos::on_change(0));
        f.subscribe(stopped);
        f.manager.stop_publication("stopped");
        f.manager.shutdown();
    }

    let f = fixture_with(Settings::default(), Some(store));
    assert_eq!(f.manager.load_persisted_subscriptions(), 3);
    let mut queued = f.manager.queued_subscription_ids(PROVIDER);
    queued.sort();
    assert_eq!(queued, vec!["active", "b1", "queued"]);

    f.manager.restore(PROVIDER, f.caller(), f.weak_sender());
    assert!(f.manager.publication_exists("active"));
    assert!(f.manager.publication_exists("b1"));
    assert_eq!(f.provider.listeners.broadcast_listener_count("fired"), 1);
}

#[tokio::test]
async fn test_expired_subscriptions_are_not_loaded() {
    let store: Arc<dyn SubscriptionStore> = Arc::new(SledStore::temporary().unwrap());
    {
        let f = fixture_with(Settings::default(), Some(store.clone()));
        let qos = SubscriptionQos::on_change(0).with_validity_ms(50);
        let request = SubscriptionRequest::with_id("brief", "speed", qos);
        f.manager.add_queued_attribute_subscription(PROXY, PROVIDER, request);
        f.manager.shutdown();
    }
    settle(100).await;

    let f = fixture_with(Settings::default(), Some(store));
    assert_eq!(f.manager.load_persisted_subscriptions(), 0);
}

#[tokio::test]
async fn test_malformed_persisted_content_loads_nothing() {
    let store: Arc<dyn SubscriptionStore> = Arc::new(SledStore::temporary().unwrap());
    let settings = Settings::default();
    store
        .save_string(&settings.publication.attribute_subscriptions_key, "{not json")
        .unwrap();

    let f = fixture_with(settings, Some(store));
    assert_eq!(f.manager.load_persisted_subscriptions(), 0);
}

#[tokio::test]
async fn test_shutdown_ends_all_publications() {
    let f = fixture();
    f.subscribe(SubscriptionRequest::with_id("tick", "speed", SubscriptionQos::periodic(50)));
    settle(20).await;

    f.manager.shutdown();
    let count = f.sender.publication_count();
    settle(150).await;

    assert_eq!(f.sender.publication_count(), count);
    assert!(!f.manager.publication_exists("tick"));
    assert_eq!(f.provider.getter_calls.load(Ordering::SeqCst), count);
}

#[tokio::test]
async fn test_scheduler_runs_and_cancels_tasks() {
    let scheduler = DelayedScheduler::new();
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    scheduler.schedule(Duration::from_millis(10), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = ran.clone();
    let cancelled = scheduler
        .schedule(Duration::from_millis(50), move || {
            counter.fetch_add(10, Ordering::SeqCst);
        })
        .unwrap();
    scheduler.unschedule(&cancelled);

    settle(100).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.pending_tasks(), 0);
}

#[tokio::test]
async fn test_scheduler_rejects_tasks_after_shutdown() {
    let scheduler = DelayedScheduler::new();
    let pending = scheduler.schedule(Duration::from_secs(60), || {}).unwrap();
    assert_eq!(scheduler.pending_tasks(), 1);

    scheduler.shutdown();
    assert!(scheduler.is_shut_down());
    assert_eq!(scheduler.pending_tasks(), 0);
    assert!(scheduler.schedule(Duration::ZERO, || {}).is_none());

    settle(10).await;
    assert!(pending.is_finished());
}
