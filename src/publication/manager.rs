use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::config::{PublicationSettings, Settings};
use crate::message::MessagingQos;
use crate::payload::{
    BroadcastSubscriptionRequest, BroadcastSubscriptionRequestInformation, MulticastPublication,
    MulticastSubscriptionRequest, NO_EXPIRY_DATE, PublicationResult, Request, RequestInformation,
    SubscriptionPublication, SubscriptionQos, SubscriptionReply, SubscriptionRequest,
    SubscriptionRequestInformation, SubscriptionRequestLike, attribute_getter_from_name,
    create_multicast_id,
};
use crate::persistence::SubscriptionStore;
use crate::provider::{
    AttributeListener, BroadcastFilter, BroadcastListener, InterpreterRegistry, RequestCaller,
};
use crate::publication::PUBLICATION_END_IN_PAST;
use crate::publication::listeners::{SubscriptionAttributeListener, UnicastBroadcastListener};
use crate::publication::scheduler::{DelayedScheduler, TaskHandle};
use crate::sender::PublicationSender;
use crate::utils::JoynrException;
use crate::utils::time::{MAX_TIME_MS, duration_until, millis, now_ms, remaining_ms};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct PublicationState {
    time_of_last_publication: i64,
    attribute_listener: Option<Arc<dyn AttributeListener>>,
    broadcast_listener: Option<Arc<dyn BroadcastListener>>,
    end_task: Option<TaskHandle>,
    poll_task: Option<TaskHandle>,
}

/// One active subscription on the provider side.
struct Publication {
    sender: Weak<dyn PublicationSender>,
    caller: Arc<dyn RequestCaller>,
    state: Mutex<PublicationState>,
    // Held by a poll from its interval check until the getter has answered.
    polling: Mutex<()>,
}

impl Publication {
    fn new(sender: Weak<dyn PublicationSender>, caller: Arc<dyn RequestCaller>) -> Self {
        Self {
            sender,
            caller,
            state: Mutex::new(PublicationState::default()),
            polling: Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, PublicationState> {
        lock(&self.state)
    }

    /// Milliseconds until `min_interval_ms` has passed since the last publication.
    fn time_until_next_publication(&self, qos: &SubscriptionQos) -> i64 {
        let min_interval = qos.min_interval_ms();
        let since_last = now_ms().saturating_sub(self.state().time_of_last_publication);
        if min_interval > 0 && since_last < min_interval {
            min_interval - since_last
        } else {
            0
        }
    }
}

/// Owns every provider-side subscription: accepts or rejects subscription
/// requests, publishes attribute values and broadcasts, ends publications
/// on expiry or stop, and persists outstanding requests.
///
/// Requests for providers that are not registered yet are queued and
/// activated in arrival order by [`PublicationManager::restore`].
pub struct PublicationManager {
    me: Weak<PublicationManager>,
    interpreters: Arc<InterpreterRegistry>,
    store: Option<Arc<dyn SubscriptionStore>>,
    multicast_sender: Weak<dyn PublicationSender>,
    ttl_uplift_ms: u64,
    settings: PublicationSettings,
    scheduler: DelayedScheduler,
    shutting_down: AtomicBool,
    publications: Mutex<HashMap<String, Arc<Publication>>>,
    // Active and queued requests, keyed by subscription id.
    attribute_requests: Mutex<HashMap<String, SubscriptionRequestInformation>>,
    broadcast_requests: Mutex<HashMap<String, BroadcastSubscriptionRequestInformation>>,
    queued_attribute_requests: Mutex<Vec<SubscriptionRequestInformation>>,
    queued_broadcast_requests: Mutex<Vec<BroadcastSubscriptionRequestInformation>>,
    // Subscriptions with a publication already on its way.
    current_scheduled: Mutex<HashSet<String>>,
    store_write: Mutex<()>,
}

impl PublicationManager {
    /// Must be called from within a Tokio runtime. `multicast_sender` is
    /// used for multicasts, which are not bound to one publication.
    pub fn new(
        settings: &Settings,
        interpreters: Arc<InterpreterRegistry>,
        store: Option<Arc<dyn SubscriptionStore>>,
        multicast_sender: Weak<dyn PublicationSender>,
    ) -> Arc<Self> {
        info!(
            max_threads = settings.publication.max_threads,
            persistent = store.is_some(),
            "starting publication manager"
        );
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            interpreters,
            store,
            multicast_sender,
            ttl_uplift_ms: settings.messaging.ttl_uplift_ms,
            settings: settings.publication.clone(),
            scheduler: DelayedScheduler::new(),
            shutting_down: AtomicBool::new(false),
            publications: Mutex::new(HashMap::new()),
            attribute_requests: Mutex::new(HashMap::new()),
            broadcast_requests: Mutex::new(HashMap::new()),
            queued_attribute_requests: Mutex::new(Vec::new()),
            queued_broadcast_requests: Mutex::new(Vec::new()),
            current_scheduled: Mutex::new(HashSet::new()),
            store_write: Mutex::new(()),
        })
    }

    pub fn add_attribute_subscription(
        &self,
        proxy_id: &str,
        provider_id: &str,
        caller: Arc<dyn RequestCaller>,
        request: SubscriptionRequest,
        sender: Weak<dyn PublicationSender>,
    ) {
        let info = RequestInformation::new(proxy_id, provider_id, request);
        self.handle_attribute_subscription_request(info, caller, sender);
    }

    /// Keeps the request until [`PublicationManager::restore`] is called for `provider_id`.
    pub fn add_queued_attribute_subscription(
        &self,
        proxy_id: &str,
        provider_id: &str,
        request: SubscriptionRequest,
    ) {
        let info = RequestInformation::new(proxy_id, provider_id, request);
        let subscription_id = info.subscription_id().to_string();
        {
            let mut queue = lock(&self.queued_attribute_requests);
            queue.retain(|queued| queued.subscription_id() != subscription_id);
            queue.push(info.clone());
        }
        lock(&self.attribute_requests).insert(subscription_id.clone(), info);
        debug!(subscription_id, provider_id, "provider not registered yet, queued attribute subscription");
        self.save_attribute_subscriptions();
    }

    pub fn add_broadcast_subscription(
        &self,
        proxy_id: &str,
        provider_id: &str,
        caller: Arc<dyn RequestCaller>,
        request: BroadcastSubscriptionRequest,
        sender: Weak<dyn PublicationSender>,
    ) {
        let info = RequestInformation::new(proxy_id, provider_id, request);
        self.handle_broadcast_subscription_request(info, caller, sender);
    }

    pub fn add_queued_broadcast_subscription(
        &self,
        proxy_id: &str,
        provider_id: &str,
        request: BroadcastSubscriptionRequest,
    ) {
        let info = RequestInformation::new(proxy_id, provider_id, request);
        let subscription_id = info.subscription_id().to_string();
        {
            let mut queue = lock(&self.queued_broadcast_requests);
            queue.retain(|queued| queued.subscription_id() != subscription_id);
            queue.push(info.clone());
        }
        lock(&self.broadcast_requests).insert(subscription_id.clone(), info);
        debug!(subscription_id, provider_id, "provider not registered yet, queued broadcast subscription");
        self.save_broadcast_subscriptions();
    }

    /// Multicast receivers are tracked by the router; only the reply is sent here.
    pub fn add_multicast_subscription(
        &self,
        proxy_id: &str,
        provider_id: &str,
        request: MulticastSubscriptionRequest,
        sender: Weak<dyn PublicationSender>,
    ) {
        debug!(
            subscription_id = %request.subscription_id,
            multicast_id = %request.multicast_id,
            "accepted multicast subscription"
        );
        self.send_subscription_reply(
            &sender,
            provider_id,
            proxy_id,
            request.qos.expiry_date_ms,
            SubscriptionReply::success(request.subscription_id),
        );
    }

    /// Ends one publication. Unknown ids are ignored.
    pub fn stop_publication(&self, subscription_id: &str) {
        trace!(subscription_id, "stopping publication");
        if lock(&self.attribute_requests).contains_key(subscription_id) {
            self.remove_attribute_publication(subscription_id);
            self.save_attribute_subscriptions();
        } else if lock(&self.broadcast_requests).contains_key(subscription_id) {
            self.remove_broadcast_publication(subscription_id);
            self.save_broadcast_subscriptions();
        } else {
            debug!(subscription_id, "no publication to stop");
        }
    }

    /// Ends every publication, active or queued, of one provider.
    pub fn remove_all_subscriptions(&self, provider_id: &str) {
        let attribute_ids: Vec<String> = lock(&self.attribute_requests)
            .values()
            .filter(|info| info.provider_participant_id == provider_id)
            .map(|info| info.subscription_id().to_string())
            .collect();
        let broadcast_ids: Vec<String> = lock(&self.broadcast_requests)
            .values()
            .filter(|info| info.provider_participant_id == provider_id)
            .map(|info| info.subscription_id().to_string())
            .collect();
        debug!(
            provider_id,
            attribute = attribute_ids.len(),
            broadcast = broadcast_ids.len(),
            "removing all subscriptions of provider"
        );

        for subscription_id in &attribute_ids {
            self.remove_attribute_publication(subscription_id);
        }
        for subscription_id in &broadcast_ids {
            self.remove_broadcast_publication(subscription_id);
        }
        self.save_attribute_subscriptions();
        self.save_broadcast_subscriptions();
    }

    /// Activates, in arrival order, every queued request for a provider that
    /// has just been registered. Expired requests are dropped.
    pub fn restore(
        &self,
        provider_id: &str,
        caller: Arc<dyn RequestCaller>,
        sender: Weak<dyn PublicationSender>,
    ) {
        trace!(provider_id, "restoring queued subscriptions");

        let attribute: Vec<SubscriptionRequestInformation> =
            take_queued(&self.queued_attribute_requests, provider_id);
        for info in attribute {
            if info.qos().is_expired() {
                debug!(subscription_id = %info.subscription_id(), "dropping expired queued subscription");
                lock(&self.attribute_requests).remove(info.subscription_id());
                continue;
            }
            self.handle_attribute_subscription_request(info, Arc::clone(&caller), sender.clone());
        }

        let broadcast: Vec<BroadcastSubscriptionRequestInformation> =
            take_queued(&self.queued_broadcast_requests, provider_id);
        for info in broadcast {
            if info.qos().is_expired() {
                debug!(subscription_id = %info.subscription_id(), "dropping expired queued subscription");
                lock(&self.broadcast_requests).remove(info.subscription_id());
                continue;
            }
            self.handle_broadcast_subscription_request(info, Arc::clone(&caller), sender.clone());
        }

        self.save_attribute_subscriptions();
        self.save_broadcast_subscriptions();
    }

    /// Queues the persisted requests that have not expired. They become
    /// active once their provider is registered. Returns how many were loaded.
    pub fn load_persisted_subscriptions(&self) -> usize {
        let attribute = self.load_requests(
            &self.settings.attribute_subscriptions_key,
            &self.queued_attribute_requests,
            &self.attribute_requests,
        );
        let broadcast = self.load_requests(
            &self.settings.broadcast_subscriptions_key,
            &self.queued_broadcast_requests,
            &self.broadcast_requests,
        );
        info!(attribute, broadcast, "loaded persisted subscriptions");
        attribute + broadcast
    }

    /// Publishes a changed attribute value, subject to the minimum interval.
    pub fn attribute_value_changed(&self, subscription_id: &str, value: Value) {
        let Some((publication, info)) = self.attribute_publication(subscription_id) else {
            error!(subscription_id, "attribute change for non-existing subscription");
            return;
        };
        if self.is_publication_scheduled(subscription_id) {
            trace!(subscription_id, "publication already scheduled, change is coalesced");
            return;
        }

        let delay = publication.time_until_next_publication(info.qos());
        if delay == 0 {
            self.send_publication(&publication, &info, Ok(vec![value]));
        } else {
            self.reschedule_publication(&publication, subscription_id, delay);
        }
    }

    pub fn broadcast_occurred(&self, subscription_id: &str, values: &[Value]) {
        self.publish_broadcast(subscription_id, values, &[]);
    }

    pub fn selective_broadcast_occurred(
        &self,
        subscription_id: &str,
        filters: &[Arc<dyn BroadcastFilter>],
        values: &[Value],
    ) {
        self.publish_broadcast(subscription_id, values, filters);
    }

    /// Sends a multicast publication with default messaging QoS.
    pub fn multicast_occurred(
        &self,
        provider_id: &str,
        broadcast_name: &str,
        partitions: &[String],
        values: Vec<Value>,
    ) {
        let publication = MulticastPublication {
            response: values,
            multicast_id: create_multicast_id(provider_id, broadcast_name, partitions),
            error: None,
        };
        match self.multicast_sender.upgrade() {
            Some(sender) => {
                trace!(multicast_id = %publication.multicast_id, "sending multicast publication");
                sender.send_multicast(provider_id, &MessagingQos::default(), publication);
            }
            None => error!(
                multicast_id = %publication.multicast_id,
                "publication sender not available, multicast is dropped"
            ),
        }
    }

    pub fn publication_exists(&self, subscription_id: &str) -> bool {
        lock(&self.publications).contains_key(subscription_id)
    }

    /// Ids still waiting for `provider_id`, in arrival order.
    pub fn queued_subscription_ids(&self, provider_id: &str) -> Vec<String> {
        let attribute = lock(&self.queued_attribute_requests)
            .iter()
            .filter(|info| info.provider_participant_id == provider_id)
            .map(|info| info.subscription_id().to_string())
            .collect::<Vec<_>>();
        let broadcast = lock(&self.queued_broadcast_requests)
            .iter()
            .filter(|info| info.provider_participant_id == provider_id)
            .map(|info| info.subscription_id().to_string())
            .collect::<Vec<_>>();
        attribute.into_iter().chain(broadcast).collect()
    }

    /// Persists outstanding requests, then ends every publication and
    /// cancels all scheduled work. Later calls are no-ops.
    pub fn shutdown(&self) {
        self.save_attribute_subscriptions();
        self.save_broadcast_subscriptions();
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.scheduler.shutdown();
        let attribute_ids: Vec<String> = lock(&self.attribute_requests).keys().cloned().collect();
        for subscription_id in &attribute_ids {
            self.remove_attribute_publication(subscription_id);
        }
        let broadcast_ids: Vec<String> = lock(&self.broadcast_requests).keys().cloned().collect();
        for subscription_id in &broadcast_ids {
            self.remove_broadcast_publication(subscription_id);
        }
        info!("publication manager shut down");
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    fn handle_attribute_subscription_request(
        &self,
        info: SubscriptionRequestInformation,
        caller: Arc<dyn RequestCaller>,
        sender: Weak<dyn PublicationSender>,
    ) {
        let subscription_id = info.subscription_id().to_string();
        if self.publication_exists(&subscription_id) {
            debug!(subscription_id, "publication already exists, replacing it");
            self.remove_attribute_publication(&subscription_id);
        }

        let qos = info.qos().clone();
        if qos.is_expired() {
            lock(&self.attribute_requests).remove(&subscription_id);
            self.send_expired_subscription_reply(&sender, &info);
            self.save_attribute_subscriptions();
            return;
        }

        let publication = Arc::new(Publication::new(sender.clone(), Arc::clone(&caller)));
        lock(&self.attribute_requests).insert(subscription_id.clone(), info.clone());
        lock(&self.publications).insert(subscription_id.clone(), Arc::clone(&publication));
        self.save_attribute_subscriptions();
        debug!(
            subscription_id,
            attribute = %info.subscribed_to_name(),
            provider_id = %info.provider_participant_id,
            "added attribute subscription"
        );

        // Held until the initial poll has published.
        lock(&self.current_scheduled).insert(subscription_id.clone());

        if qos.is_on_change() {
            let listener: Arc<dyn AttributeListener> =
                Arc::new(SubscriptionAttributeListener::new(&subscription_id, self.me.clone()));
            caller.register_attribute_listener(info.subscribed_to_name(), Arc::clone(&listener));
            publication.state().attribute_listener = Some(listener);
        }
        let end_task = self.schedule_publication_end(&qos, &subscription_id);
        publication.state().end_task = end_task;

        self.send_subscription_reply(
            &sender,
            &info.provider_participant_id,
            &info.proxy_participant_id,
            qos.expiry_date_ms,
            SubscriptionReply::success(subscription_id.clone()),
        );
        self.schedule_poll(&publication, &subscription_id, Duration::ZERO);
    }

    fn handle_broadcast_subscription_request(
        &self,
        info: BroadcastSubscriptionRequestInformation,
        caller: Arc<dyn RequestCaller>,
        sender: Weak<dyn PublicationSender>,
    ) {
        let subscription_id = info.subscription_id().to_string();
        if self.publication_exists(&subscription_id) {
            debug!(subscription_id, "publication already exists, replacing it");
            self.remove_broadcast_publication(&subscription_id);
        }

        let qos = info.qos().clone();
        if qos.is_expired() {
            lock(&self.broadcast_requests).remove(&subscription_id);
            self.send_expired_subscription_reply(&sender, &info);
            self.save_broadcast_subscriptions();
            return;
        }

        let publication = Arc::new(Publication::new(sender.clone(), Arc::clone(&caller)));
        lock(&self.broadcast_requests).insert(subscription_id.clone(), info.clone());
        lock(&self.publications).insert(subscription_id.clone(), Arc::clone(&publication));
        self.save_broadcast_subscriptions();
        debug!(
            subscription_id,
            broadcast = %info.subscribed_to_name(),
            provider_id = %info.provider_participant_id,
            "added broadcast subscription"
        );

        let listener: Arc<dyn BroadcastListener> =
            Arc::new(UnicastBroadcastListener::new(&subscription_id, self.me.clone()));
        caller.register_broadcast_listener(info.subscribed_to_name(), Arc::clone(&listener));
        publication.state().broadcast_listener = Some(listener);
        let end_task = self.schedule_publication_end(&qos, &subscription_id);
        publication.state().end_task = end_task;

        self.send_subscription_reply(
            &sender,
            &info.provider_participant_id,
            &info.proxy_participant_id,
            qos.expiry_date_ms,
            SubscriptionReply::success(subscription_id),
        );
    }

    fn remove_attribute_publication(&self, subscription_id: &str) {
        let publication = lock(&self.publications).remove(subscription_id);
        let info = lock(&self.attribute_requests).remove(subscription_id);
        lock(&self.queued_attribute_requests).retain(|queued| queued.subscription_id() != subscription_id);
        lock(&self.current_scheduled).remove(subscription_id);

        let (Some(publication), Some(info)) = (publication, info) else {
            return;
        };
        let (listener, tasks) = {
            let mut state = publication.state();
            (state.attribute_listener.take(), [state.end_task.take(), state.poll_task.take()])
        };
        if let Some(listener) = listener {
            publication
                .caller
                .unregister_attribute_listener(info.subscribed_to_name(), &listener);
        }
        for task in tasks.iter().flatten() {
            self.scheduler.unschedule(task);
        }
        debug!(subscription_id, "removed attribute publication");
    }

    fn remove_broadcast_publication(&self, subscription_id: &str) {
        let publication = lock(&self.publications).remove(subscription_id);
        let info = lock(&self.broadcast_requests).remove(subscription_id);
        lock(&self.queued_broadcast_requests).retain(|queued| queued.subscription_id() != subscription_id);

        let (Some(publication), Some(info)) = (publication, info) else {
            return;
        };
        let (listener, end_task) = {
            let mut state = publication.state();
            (state.broadcast_listener.take(), state.end_task.take())
        };
        if let Some(listener) = listener {
            publication
                .caller
                .unregister_broadcast_listener(info.subscribed_to_name(), &listener);
        }
        if let Some(end_task) = end_task {
            self.scheduler.unschedule(&end_task);
        }
        debug!(subscription_id, "removed broadcast publication");
    }

    /// The end is uplifted like the request was, and kept clear of the
    /// largest representable time.
    fn schedule_publication_end(&self, qos: &SubscriptionQos, subscription_id: &str) -> Option<TaskHandle> {
        if !qos.has_expiry() {
            return None;
        }
        let uplift = i64::try_from(self.ttl_uplift_ms).unwrap_or(MAX_TIME_MS);
        let latest_end = MAX_TIME_MS.saturating_sub(self.settings.end_tolerance_ms);
        let end_ms = if qos.expiry_date_ms > latest_end.saturating_sub(uplift) {
            latest_end
        } else {
            qos.expiry_date_ms + uplift
        };
        trace!(subscription_id, end_ms, "scheduling publication end");

        let manager = self.me.clone();
        let subscription_id = subscription_id.to_string();
        self.scheduler.schedule(duration_until(end_ms), move || {
            if let Some(manager) = manager.upgrade() {
                manager.on_publication_end(&subscription_id);
            }
        })
    }

    fn on_publication_end(&self, subscription_id: &str) {
        let publication = lock(&self.publications).get(subscription_id).cloned();
        if let Some(publication) = publication {
            // The running task must not be cancelled through its own handle.
            publication.state().end_task = None;
        }
        debug!(subscription_id, "publication ended");
        self.stop_publication(subscription_id);
    }

    /// The poll is bound to `publication`; it does nothing once that
    /// publication was removed, even if the id is reused. Only the latest
    /// pending poll is kept.
    fn schedule_poll(&self, publication: &Arc<Publication>, subscription_id: &str, delay: Duration) {
        let manager = self.me.clone();
        let target = Arc::downgrade(publication);
        let id = subscription_id.to_string();
        let task = self.scheduler.schedule(delay, move || {
            if let (Some(manager), Some(publication)) = (manager.upgrade(), target.upgrade()) {
                manager.poll_subscription(&publication, &id);
            }
        });
        let previous = std::mem::replace(&mut publication.state().poll_task, task);
        if let Some(previous) = previous {
            self.scheduler.unschedule(&previous);
        }
    }

    /// Marks the subscription as scheduled and polls after `delay_ms`.
    fn reschedule_publication(&self, publication: &Arc<Publication>, subscription_id: &str, delay_ms: i64) {
        let inserted = lock(&self.current_scheduled).insert(subscription_id.to_string());
        if inserted {
            trace!(subscription_id, delay_ms, "rescheduling publication");
            self.schedule_poll(publication, subscription_id, millis(delay_ms));
        }
    }

    /// Reads the attribute through its getter and publishes the outcome.
    fn poll_subscription(&self, publication: &Arc<Publication>, subscription_id: &str) {
        if self.is_shutting_down() {
            return;
        }
        let _polling = lock(&publication.polling);
        let Some((current, info)) = self.attribute_publication(subscription_id) else {
            trace!(subscription_id, "publication is gone, poll skipped");
            return;
        };
        if !Arc::ptr_eq(&current, publication) {
            trace!(subscription_id, "publication was replaced, stale poll skipped");
            return;
        }
        // This task is running; it must not be cancelled through its own handle.
        publication.state().poll_task = None;

        let interval = info.qos().periodic_interval_ms();
        if let Some(interval) = interval {
            let since_last =
                now_ms().saturating_sub(publication.state().time_of_last_publication);
            if since_last < interval {
                trace!(subscription_id, "last publication is recent, poll postponed");
                self.schedule_poll(publication, subscription_id, millis(interval - since_last));
                return;
            }
        }

        let caller = Arc::clone(&publication.caller);
        let Some(interpreter) = self.interpreters.for_caller(caller.as_ref()) else {
            error!(
                subscription_id,
                interface = caller.interface_name(),
                "no request interpreter for provider, attribute cannot be polled"
            );
            return;
        };

        let request = Request::new(attribute_getter_from_name(info.subscribed_to_name()));
        let on_success = {
            let manager = self.me.clone();
            let publication = Arc::clone(publication);
            let info = info.clone();
            Box::new(move |response: Vec<Value>| {
                if let Some(manager) = manager.upgrade() {
                    manager.send_publication(&publication, &info, Ok(response));
                    manager.reschedule_poll(&publication, &info, interval);
                }
            })
        };
        let on_error = {
            let manager = self.me.clone();
            let publication = Arc::clone(publication);
            Box::new(move |exception: JoynrException| {
                if let Some(manager) = manager.upgrade() {
                    warn!(subscription_id = %info.subscription_id(), error = %exception, "attribute getter failed");
                    manager.send_publication(&publication, &info, Err(exception));
                    manager.reschedule_poll(&publication, &info, interval);
                }
            })
        };
        interpreter.execute(caller, request, on_success, on_error);
    }

    fn reschedule_poll(
        &self,
        publication: &Arc<Publication>,
        info: &SubscriptionRequestInformation,
        interval: Option<i64>,
    ) {
        let Some(interval) = interval else {
            return;
        };
        if info.qos().is_expired() || self.is_shutting_down() {
            return;
        }
        let still_active = lock(&self.publications)
            .get(info.subscription_id())
            .is_some_and(|current| Arc::ptr_eq(current, publication));
        if still_active {
            self.schedule_poll(publication, info.subscription_id(), millis(interval));
        }
    }

    fn publish_broadcast(
        &self,
        subscription_id: &str,
        values: &[Value],
        filters: &[Arc<dyn BroadcastFilter>],
    ) {
        let Some((publication, info)) = self.broadcast_publication(subscription_id) else {
            error!(subscription_id, "broadcast for non-existing subscription");
            return;
        };
        if publication.time_until_next_publication(info.qos()) > 0 {
            debug!(subscription_id, "omitting broadcast publication, minimum interval not reached");
            return;
        }
        if !filters.is_empty() {
            let parameters = info.request.filter_parameters.clone().unwrap_or_default();
            if !filters.iter().all(|filter| filter.filter_forward(values, &parameters)) {
                trace!(subscription_id, "broadcast filtered out");
                return;
            }
        }
        self.send_publication(&publication, &info, Ok(values.to_vec()));
    }

    fn send_publication<R: SubscriptionRequestLike>(
        &self,
        publication: &Publication,
        info: &RequestInformation<R>,
        result: PublicationResult,
    ) {
        let subscription_id = info.subscription_id().to_string();
        let message = match result {
            Ok(response) => SubscriptionPublication {
                response,
                subscription_id: subscription_id.clone(),
                error: None,
            },
            Err(error) => SubscriptionPublication {
                response: Vec::new(),
                subscription_id: subscription_id.clone(),
                error: Some(error),
            },
        };
        let qos = MessagingQos::with_ttl(u64::try_from(info.qos().publication_ttl_ms).unwrap_or(0));

        let mut state = publication.state();
        match publication.sender.upgrade() {
            Some(sender) => {
                sender.send_subscription_publication(
                    &info.provider_participant_id,
                    &info.proxy_participant_id,
                    &qos,
                    message,
                );
                state.time_of_last_publication = now_ms();
                lock(&self.current_scheduled).remove(&subscription_id);
                trace!(subscription_id, "sent publication");
            }
            None => error!(subscription_id, "publication sender not available, publication is dropped"),
        }
    }

    fn send_subscription_reply(
        &self,
        sender: &Weak<dyn PublicationSender>,
        provider_id: &str,
        proxy_id: &str,
        expiry_date_ms: i64,
        reply: SubscriptionReply,
    ) {
        let ttl_ms = if expiry_date_ms == NO_EXPIRY_DATE {
            MAX_TIME_MS as u64
        } else {
            remaining_ms(expiry_date_ms)
        };
        match sender.upgrade() {
            Some(sender) => {
                sender.send_subscription_reply(provider_id, proxy_id, &MessagingQos::with_ttl(ttl_ms), reply)
            }
            None => error!(
                subscription_id = %reply.subscription_id,
                "publication sender not available, subscription reply is dropped"
            ),
        }
    }

    fn send_expired_subscription_reply<R: SubscriptionRequestLike>(
        &self,
        sender: &Weak<dyn PublicationSender>,
        info: &RequestInformation<R>,
    ) {
        let subscription_id = info.subscription_id();
        warn!(subscription_id, "publication end is in the past, rejecting subscription");
        let expiry_ms = now_ms()
            .saturating_add(i64::try_from(self.settings.expired_reply_ttl_ms).unwrap_or(MAX_TIME_MS))
            .saturating_add(i64::try_from(self.ttl_uplift_ms).unwrap_or(MAX_TIME_MS));
        let exception = JoynrException::subscription(PUBLICATION_END_IN_PAST, subscription_id);
        self.send_subscription_reply(
            sender,
            &info.provider_participant_id,
            &info.proxy_participant_id,
            expiry_ms,
            SubscriptionReply::failure(subscription_id, exception),
        );
    }

    fn is_publication_scheduled(&self, subscription_id: &str) -> bool {
        lock(&self.current_scheduled).contains(subscription_id)
    }

    fn attribute_publication(
        &self,
        subscription_id: &str,
    ) -> Option<(Arc<Publication>, SubscriptionRequestInformation)> {
        let publication = lock(&self.publications).get(subscription_id).cloned()?;
        let info = lock(&self.attribute_requests).get(subscription_id).cloned()?;
        Some((publication, info))
    }

    fn broadcast_publication(
        &self,
        subscription_id: &str,
    ) -> Option<(Arc<Publication>, BroadcastSubscriptionRequestInformation)> {
        let publication = lock(&self.publications).get(subscription_id).cloned()?;
        let info = lock(&self.broadcast_requests).get(subscription_id).cloned()?;
        Some((publication, info))
    }

    fn save_attribute_subscriptions(&self) {
        self.save_requests(&self.settings.attribute_subscriptions_key, &self.attribute_requests);
    }

    fn save_broadcast_subscriptions(&self) {
        self.save_requests(&self.settings.broadcast_subscriptions_key, &self.broadcast_requests);
    }

    /// Writes every non-expired request of `table` under `key`.
    fn save_requests<R>(&self, key: &str, table: &Mutex<HashMap<String, RequestInformation<R>>>)
    where
        R: SubscriptionRequestLike + Serialize + Clone,
    {
        let Some(store) = &self.store else {
            return;
        };
        if self.is_shutting_down() {
            debug!(key, "already shutting down, subscriptions are not saved");
            return;
        }

        let _write = lock(&self.store_write);
        let entries: Vec<RequestInformation<R>> = lock(table)
            .values()
            .filter(|info| !info.qos().is_expired())
            .cloned()
            .collect();
        let content = match serde_json::to_string(&entries) {
            Ok(content) => content,
            Err(e) => {
                error!(key, error = %e, "could not serialize subscription requests");
                return;
            }
        };
        match store.save_string(key, &content) {
            Ok(()) => trace!(key, count = entries.len(), "saved subscription requests"),
            Err(e) => error!(key, error = %e, "could not persist subscription requests"),
        }
    }

    fn load_requests<R>(
        &self,
        key: &str,
        queue: &Mutex<Vec<RequestInformation<R>>>,
        table: &Mutex<HashMap<String, RequestInformation<R>>>,
    ) -> usize
    where
        R: SubscriptionRequestLike + DeserializeOwned + Clone,
    {
        let Some(store) = &self.store else {
            return 0;
        };
        let content = match store.load_string(key) {
            Ok(Some(content)) => content,
            Ok(None) => return 0,
            Err(e) => {
                error!(key, error = %e, "could not load persisted subscriptions");
                return 0;
            }
        };
        let entries: Vec<RequestInformation<R>> = match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                error!(key, error = %e, "persisted subscriptions are malformed, ignoring them");
                return 0;
            }
        };

        let mut queue = lock(queue);
        let mut table = lock(table);
        let mut loaded = 0;
        for info in entries {
            let subscription_id = info.subscription_id().to_string();
            if info.qos().is_expired() {
                debug!(subscription_id, "skipping expired persisted subscription");
                continue;
            }
            queue.retain(|queued| queued.subscription_id() != subscription_id);
            queue.push(info.clone());
            table.insert(subscription_id, info);
            loaded += 1;
        }
        loaded
    }
}

impl Drop for PublicationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Removes and returns the queued requests of `provider_id`, order kept.
fn take_queued<R>(queue: &Mutex<Vec<RequestInformation<R>>>, provider_id: &str) -> Vec<RequestInformation<R>> {
    let mut queue = lock(queue);
    let (matching, rest): (Vec<_>, Vec<_>) = queue
        .drain(..)
        .partition(|info| info.provider_participant_id == provider_id);
    *queue = rest;
    matching
}
