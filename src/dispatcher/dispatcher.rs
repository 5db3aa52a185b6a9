use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::dispatcher::reply_caller::{ReplyCaller, ReplyCallerDirectory};
use crate::message::{ImmutableMessage, MessageType, MessagingQos, MessagingQosEffort};
use crate::payload::{
    BroadcastSubscriptionRequest, Codec, MulticastPublication, MulticastSubscriptionRequest,
    OneWayRequest, Reply, Request, SubscriptionPublication, SubscriptionReply,
    SubscriptionRequest, SubscriptionStop, decode_as,
};
use crate::provider::{InterpreterRegistry, RequestCaller, RequestInterpreter};
use crate::publication::PublicationManager;
use crate::sender::{MessageSender, PublicationSender};
use crate::subscription::SubscriptionManager;
use crate::utils::time::{now_ms, remaining_ms};
use crate::utils::{Error, JoynrException, Result};

/// Routing details of a received request needed to answer it later.
#[derive(Clone)]
struct ReplyContext {
    provider_id: String,
    proxy_id: String,
    request_expiry_ms: i64,
    custom_headers: HashMap<String, String>,
    effort: Option<MessagingQosEffort>,
    compress: bool,
    local: bool,
}

impl ReplyContext {
    fn from_request(message: &ImmutableMessage) -> Self {
        Self {
            provider_id: message.recipient().to_string(),
            proxy_id: message.sender().to_string(),
            request_expiry_ms: message.expiry_date_ms(),
            custom_headers: message.custom_headers(),
            effort: message.effort(),
            compress: message.is_compressed(),
            local: message.is_local_message(),
        }
    }

    /// The reply lives only as long as the request still has left.
    fn send(&self, sender: &MessageSender, reply: Reply) {
        let ttl_ms = remaining_ms(self.request_expiry_ms);
        if ttl_ms == 0 {
            warn!(
                request_reply_id = %reply.request_reply_id,
                "request expired, reply is not sent"
            );
            return;
        }
        let mut qos = MessagingQos::with_ttl(ttl_ms);
        qos.custom_headers = self.custom_headers.clone();
        qos.effort = self.effort;
        qos.compress = self.compress;
        sender.send_reply(&self.provider_id, &self.proxy_id, &qos, reply, self.local);
    }
}

/// Demultiplexes received messages onto request callers, reply callers,
/// the publication manager and the subscription manager.
///
/// All received messages are handled one at a time, in arrival order, by a
/// single worker task. Registration calls may come from any thread.
pub struct Dispatcher {
    sender: Arc<MessageSender>,
    codec: Arc<dyn Codec>,
    interpreters: Arc<InterpreterRegistry>,
    is_shutting_down: RwLock<bool>,
    request_callers: Mutex<HashMap<String, Arc<dyn RequestCaller>>>,
    reply_callers: ReplyCallerDirectory,
    publication_manager: RwLock<Weak<PublicationManager>>,
    subscription_manager: RwLock<Option<Arc<dyn SubscriptionManager>>>,
    // Serializes caller registration plus restore against incoming
    // subscription requests.
    pub(super) subscription_handling: Mutex<()>,
    queue: Mutex<Option<mpsc::UnboundedSender<ImmutableMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Starts the worker task; must be called from within a Tokio runtime.
    pub fn new(sender: Arc<MessageSender>, interpreters: Arc<InterpreterRegistry>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let codec = Arc::clone(sender.factory().codec());

        let dispatcher = Arc::new(Self {
            sender,
            codec,
            interpreters,
            is_shutting_down: RwLock::new(false),
            request_callers: Mutex::new(HashMap::new()),
            reply_callers: ReplyCallerDirectory::new(),
            publication_manager: RwLock::new(Weak::new()),
            subscription_manager: RwLock::new(None),
            subscription_handling: Mutex::new(()),
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(None),
        });

        let worker = tokio::spawn(run_worker(Arc::downgrade(&dispatcher), rx));
        *dispatcher
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(worker);
        dispatcher
    }

    /// Registers a provider. Subscription requests queued for it are
    /// restored under the same lock that guards subscription handling.
    pub fn add_request_caller(&self, participant_id: &str, caller: Arc<dyn RequestCaller>) {
        let _guard = self
            .subscription_handling
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_shut_down() {
            debug!(participant_id, "dispatcher is shut down, request caller not added");
            return;
        }

        self.request_callers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(participant_id.to_string(), Arc::clone(&caller));
        debug!(participant_id, "added request caller");

        if let Some(pm) = self.publication_manager() {
            pm.restore(participant_id, caller, self.publication_sender());
        } else {
            warn!(
                participant_id,
                "no publication manager registered, subscriptions are not restored"
            );
        }
    }

    /// Stops every subscription of the provider before forgetting it.
    pub fn remove_request_caller(&self, participant_id: &str) {
        let _guard = self
            .subscription_handling
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_shut_down() {
            return;
        }
        if let Some(pm) = self.publication_manager() {
            pm.remove_all_subscriptions(participant_id);
        }
        self.request_callers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(participant_id);
        debug!(participant_id, "removed request caller");
    }

    pub fn add_reply_caller(
        &self,
        request_reply_id: &str,
        caller: Arc<dyn ReplyCaller>,
        expiry_date_ms: i64,
    ) {
        if self.is_shut_down() {
            debug!(request_reply_id, "dispatcher is shut down, reply caller not added");
            return;
        }
        self.reply_callers
            .add(request_reply_id, caller, expiry_date_ms);
    }

    pub fn remove_reply_caller(&self, request_reply_id: &str) {
        self.reply_callers.remove(request_reply_id);
    }

    pub fn has_reply_caller(&self, request_reply_id: &str) -> bool {
        self.reply_callers.contains(request_reply_id)
    }

    pub fn register_subscription_manager(&self, manager: Arc<dyn SubscriptionManager>) {
        *self
            .subscription_manager
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(manager);
    }

    /// Only a weak handle is kept; the runtime owns the publication manager.
    pub fn register_publication_manager(&self, manager: &Arc<PublicationManager>) {
        *self
            .publication_manager
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(manager);
    }

    /// Queues a message for the worker. Dropped silently during shutdown.
    pub fn receive(&self, message: ImmutableMessage) {
        let Ok(shutting_down) = self.is_shutting_down.try_read() else {
            debug!(message = %message, "dispatcher is shutting down, dropping message");
            return;
        };
        if *shutting_down {
            debug!(message = %message, "dispatcher is shut down, dropping message");
            return;
        }

        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(message) {
                    error!(message = %e.0, "dispatcher worker is gone, dropping message");
                }
            }
            None => debug!(message = %message, "dispatcher queue closed, dropping message"),
        }
    }

    pub fn shutdown(&self) {
        {
            let mut shutting_down = self
                .is_shutting_down
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *shutting_down {
                return;
            }
            *shutting_down = true;
        }

        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
        {
            let _guard = self
                .subscription_handling
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.request_callers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        self.reply_callers.shutdown();
        debug!("dispatcher shut down");
    }

    /// A pending writer means `shutdown` is running.
    fn is_shut_down(&self) -> bool {
        match self.is_shutting_down.try_read() {
            Ok(flag) => *flag,
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(e)) => *e.into_inner(),
        }
    }

    fn publication_manager(&self) -> Option<Arc<PublicationManager>> {
        self.publication_manager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    fn subscription_manager(&self) -> Option<Arc<dyn SubscriptionManager>> {
        self.subscription_manager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn publication_sender(&self) -> Weak<dyn PublicationSender> {
        let sender: Arc<dyn PublicationSender> = self.sender.clone();
        Arc::downgrade(&sender)
    }

    pub(super) fn request_caller(&self, participant_id: &str) -> Option<Arc<dyn RequestCaller>> {
        self.request_callers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(participant_id)
            .cloned()
    }

    fn decode<T>(&self, message: &ImmutableMessage) -> Option<T>
    where
        T: TryFrom<crate::payload::Payload, Error = Error>,
    {
        let decoded: Result<T> = decode_as(self.codec.as_ref(), message.payload());
        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                error!(message = %message, error = %e, "could not deserialize payload, dropping message");
                None
            }
        }
    }

    fn caller_and_interpreter(
        &self,
        message: &ImmutableMessage,
    ) -> Option<(Arc<dyn RequestCaller>, Arc<dyn RequestInterpreter>)> {
        let Some(caller) = self.request_caller(message.recipient()) else {
            error!(message = %message, "no request caller for recipient, dropping message");
            return None;
        };
        let Some(interpreter) = self.interpreters.for_caller(caller.as_ref()) else {
            error!(
                message = %message,
                interface = caller.interface_name(),
                major_version = caller.major_version(),
                "no request interpreter for interface, dropping message"
            );
            return None;
        };
        Some((caller, interpreter))
    }

    fn handle_received_message(&self, message: ImmutableMessage) {
        let shutting_down = self
            .is_shutting_down
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if *shutting_down {
            return;
        }

        if message.is_expired(now_ms()) {
            warn!(message = %message, "dropping expired message");
            return;
        }

        trace!(message = %message, "handling received message");
        match message.message_type() {
            MessageType::Request => self.handle_request_received(&message),
            MessageType::OneWay => self.handle_one_way_request_received(&message),
            MessageType::Reply => self.handle_reply_received(&message),
            MessageType::SubscriptionRequest => self.handle_subscription_request_received(&message),
            MessageType::BroadcastSubscriptionRequest => {
                self.handle_broadcast_subscription_request_received(&message)
            }
            MessageType::MulticastSubscriptionRequest => {
                self.handle_multicast_subscription_request_received(&message)
            }
            MessageType::SubscriptionStop => self.handle_subscription_stop_received(&message),
            MessageType::SubscriptionReply => self.handle_subscription_reply_received(&message),
            MessageType::Publication => self.handle_publication_received(&message),
            MessageType::Multicast => self.handle_multicast_received(&message),
        }
    }

    fn handle_request_received(&self, message: &ImmutableMessage) {
        let Some((caller, interpreter)) = self.caller_and_interpreter(message) else {
            return;
        };
        let Some(request) = self.decode::<Request>(message) else {
            return;
        };

        let request_reply_id = request.request_reply_id.clone();
        let context = ReplyContext::from_request(message);

        let on_success = {
            let sender = Arc::clone(&self.sender);
            let context = context.clone();
            let request_reply_id = request_reply_id.clone();
            Box::new(move |response: Vec<Value>| {
                context.send(&sender, Reply::success(request_reply_id, response));
            })
        };
        let on_error = {
            let sender = Arc::clone(&self.sender);
            Box::new(move |exception: JoynrException| {
                if exception.is_application() {
                    debug!(request_reply_id = %request_reply_id, error = %exception, "request returned application error");
                } else {
                    error!(request_reply_id = %request_reply_id, error = %exception, "request failed");
                }
                context.send(&sender, Reply::failure(request_reply_id, exception));
            })
        };

        interpreter.execute(caller, request, on_success, on_error);
    }

    fn handle_one_way_request_received(&self, message: &ImmutableMessage) {
        let Some((caller, interpreter)) = self.caller_and_interpreter(message) else {
            return;
        };
        let Some(request) = self.decode::<OneWayRequest>(message) else {
            return;
        };

        let method_name = request.method_name.clone();
        interpreter.execute(
            caller,
            request.into_request(),
            Box::new(|_| {}),
            Box::new(move |exception| {
                error!(method = %method_name, error = %exception, "one-way request failed");
            }),
        );
    }

    fn handle_reply_received(&self, message: &ImmutableMessage) {
        let Some(reply) = self.decode::<Reply>(message) else {
            return;
        };
        match self.reply_callers.take(&reply.request_reply_id) {
            Some(caller) => caller.execute(reply),
            None => warn!(
                request_reply_id = %reply.request_reply_id,
                "no reply caller found, reply expired or was already handled"
            ),
        }
    }

    fn handle_subscription_request_received(&self, message: &ImmutableMessage) {
        let Some(request) = self.decode::<SubscriptionRequest>(message) else {
            return;
        };
        let Some(pm) = self.publication_manager() else {
            error!(message = %message, "publication manager not available, dropping subscription request");
            return;
        };

        let _guard = self
            .subscription_handling
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (proxy_id, provider_id) = (message.sender(), message.recipient());
        match self.request_caller(provider_id) {
            Some(caller) => {
                pm.add_attribute_subscription(proxy_id, provider_id, caller, request, self.publication_sender())
            }
            None => pm.add_queued_attribute_subscription(proxy_id, provider_id, request),
        }
    }

    fn handle_broadcast_subscription_request_received(&self, message: &ImmutableMessage) {
        let Some(request) = self.decode::<BroadcastSubscriptionRequest>(message) else {
            return;
        };
        let Some(pm) = self.publication_manager() else {
            error!(message = %message, "publication manager not available, dropping subscription request");
            return;
        };

        let _guard = self
            .subscription_handling
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (proxy_id, provider_id) = (message.sender(), message.recipient());
        match self.request_caller(provider_id) {
            Some(caller) => {
                pm.add_broadcast_subscription(proxy_id, provider_id, caller, request, self.publication_sender())
            }
            None => pm.add_queued_broadcast_subscription(proxy_id, provider_id, request),
        }
    }

    fn handle_multicast_subscription_request_received(&self, message: &ImmutableMessage) {
        let Some(request) = self.decode::<MulticastSubscriptionRequest>(message) else {
            return;
        };
        match self.publication_manager() {
            Some(pm) => pm.add_multicast_subscription(
                message.sender(),
                message.recipient(),
                request,
                self.publication_sender(),
            ),
            None => error!(message = %message, "publication manager not available, dropping subscription request"),
        }
    }

    fn handle_subscription_stop_received(&self, message: &ImmutableMessage) {
        let Some(stop) = self.decode::<SubscriptionStop>(message) else {
            return;
        };
        match self.publication_manager() {
            Some(pm) => pm.stop_publication(&stop.subscription_id),
            None => error!(message = %message, "publication manager not available, dropping subscription stop"),
        }
    }

    fn handle_subscription_reply_received(&self, message: &ImmutableMessage) {
        let Some(reply) = self.decode::<SubscriptionReply>(message) else {
            return;
        };
        let Some(manager) = self.subscription_manager() else {
            error!(message = %message, "no subscription manager registered, dropping subscription reply");
            return;
        };
        match manager.subscription_callback(&reply.subscription_id) {
            Some(callback) => callback.on_subscription_reply(reply),
            None => warn!(
                subscription_id = %reply.subscription_id,
                "subscription reply for unknown subscription, it may have expired or been unregistered"
            ),
        }
    }

    fn handle_publication_received(&self, message: &ImmutableMessage) {
        let Some(publication) = self.decode::<SubscriptionPublication>(message) else {
            return;
        };
        let Some(manager) = self.subscription_manager() else {
            error!(message = %message, "no subscription manager registered, dropping publication");
            return;
        };

        let subscription_id = publication.subscription_id.clone();
        manager.touch_subscription_state(&subscription_id);
        match manager.subscription_callback(&subscription_id) {
            Some(callback) => callback.on_publication(publication.into_result()),
            None => warn!(
                subscription_id = %subscription_id,
                "publication for unknown subscription, it may have expired or been unregistered"
            ),
        }
    }

    fn handle_multicast_received(&self, message: &ImmutableMessage) {
        let Some(publication) = self.decode::<MulticastPublication>(message) else {
            return;
        };
        let Some(manager) = self.subscription_manager() else {
            error!(message = %message, "no subscription manager registered, dropping multicast");
            return;
        };

        let callbacks = manager.multicast_callbacks(&publication.multicast_id);
        if callbacks.is_empty() {
            warn!(multicast_id = %publication.multicast_id, "no subscription for multicast");
            return;
        }
        let result = publication.into_result();
        for callback in callbacks {
            callback.on_publication(result.clone());
        }
    }
}

async fn run_worker(
    dispatcher: Weak<Dispatcher>,
    mut queue: mpsc::UnboundedReceiver<ImmutableMessage>,
) {
    while let Some(message) = queue.recv().await {
        let Some(dispatcher) = dispatcher.upgrade() else {
            break;
        };
        dispatcher.handle_received_message(message);
    }
    trace!("dispatcher worker stopped");
}
