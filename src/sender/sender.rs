use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, error, trace};

use crate::dispatcher::{Dispatcher, ReplyCaller};
use crate::factory::MessageFactory;
use crate::message::{MessagingQos, MutableMessage};
use crate::payload::{
    BroadcastSubscriptionRequest, MulticastPublication, MulticastSubscriptionRequest,
    OneWayRequest, Reply, Request, SubscriptionPublication, SubscriptionReply,
    SubscriptionRequest, SubscriptionStop,
};
use crate::sender::{MessageRouter, PublicationSender};
use crate::utils::{Error, JoynrException, Result};

fn method_invocation(e: Error) -> Error {
    match e {
        Error::MethodInvocation(_) => e,
        other => Error::MethodInvocation(other.to_string()),
    }
}

pub struct MessageSender {
    factory: MessageFactory,
    router: Arc<dyn MessageRouter>,
    reply_to_address: Option<String>,
    dispatcher: RwLock<Weak<Dispatcher>>,
}

impl MessageSender {
    /// An empty `reply_to_address` means no reply-to is attached.
    pub fn new(factory: MessageFactory, router: Arc<dyn MessageRouter>, reply_to_address: &str) -> Self {
        Self {
            factory,
            router,
            reply_to_address: (!reply_to_address.is_empty()).then(|| reply_to_address.to_string()),
            dispatcher: RwLock::new(Weak::new()),
        }
    }

    /// The sender only keeps a non-owning handle; the runtime owns the dispatcher.
    pub fn register_dispatcher(&self, dispatcher: &Arc<Dispatcher>) {
        *self
            .dispatcher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(dispatcher);
    }

    pub fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.dispatcher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    /// Sends a request and registers `reply_caller` for its reply.
    pub fn send_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        request: Request,
        reply_caller: Arc<dyn ReplyCaller>,
        is_local: bool,
    ) -> Result<()> {
        let request_reply_id = request.request_reply_id.clone();
        let message = self
            .factory
            .create_request(sender_id, receiver_id, qos, request, is_local)
            .map_err(method_invocation)?;

        let Some(dispatcher) = self.dispatcher() else {
            error!(
                request_reply_id = %request_reply_id,
                "dispatcher is no longer available, request is not sent"
            );
            return Ok(());
        };

        // Registered before routing so a fast reply always finds its caller.
        dispatcher.add_reply_caller(&request_reply_id, reply_caller, message.expiry_date_ms);

        if let Err(e) = self.route_request(message) {
            dispatcher.remove_reply_caller(&request_reply_id);
            return Err(e);
        }
        Ok(())
    }

    pub fn send_one_way_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        request: OneWayRequest,
        is_local: bool,
    ) -> Result<()> {
        let message = self
            .factory
            .create_one_way_request(sender_id, receiver_id, qos, request, is_local)
            .map_err(method_invocation)?;
        self.route_request(message)
    }

    pub fn send_subscription_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        request: SubscriptionRequest,
        is_local: bool,
    ) -> Result<()> {
        let message = self
            .factory
            .create_subscription_request(sender_id, receiver_id, qos, request, is_local)
            .map_err(method_invocation)?;
        self.route_request(message)
    }

    pub fn send_broadcast_subscription_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        request: BroadcastSubscriptionRequest,
        is_local: bool,
    ) -> Result<()> {
        let message = self
            .factory
            .create_broadcast_subscription_request(sender_id, receiver_id, qos, request, is_local)
            .map_err(method_invocation)?;
        self.route_request(message)
    }

    /// Multicast subscriptions are fulfilled by registering a multicast
    /// receiver with the router. The subscription reply is synthesized here
    /// instead of coming back from the provider.
    pub fn send_multicast_subscription_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        request: MulticastSubscriptionRequest,
    ) -> Result<()> {
        let subscription_id = request.subscription_id;
        let reply = match self
            .router
            .add_multicast_receiver(&request.multicast_id, sender_id, receiver_id)
        {
            Ok(()) => SubscriptionReply::success(subscription_id),
            Err(e) => {
                error!(
                    multicast_id = %request.multicast_id,
                    error = %e,
                    "could not register multicast receiver"
                );
                let error = JoynrException::subscription(
                    format!("could not register multicast receiver: {e}"),
                    subscription_id.clone(),
                );
                SubscriptionReply::failure(subscription_id, error)
            }
        };
        self.send_subscription_reply(receiver_id, sender_id, qos, reply);
        Ok(())
    }

    /// Counterpart of [`send_multicast_subscription_request`](Self::send_multicast_subscription_request).
    pub fn send_multicast_subscription_stop(&self, sender_id: &str, receiver_id: &str, multicast_id: &str) {
        if let Err(e) = self
            .router
            .remove_multicast_receiver(multicast_id, sender_id, receiver_id)
        {
            error!(multicast_id, error = %e, "could not remove multicast receiver");
        }
    }

    pub fn send_subscription_stop(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        stop: SubscriptionStop,
    ) {
        let built = self
            .factory
            .create_subscription_stop(sender_id, receiver_id, qos, stop, false);
        self.route_logged(built, "subscription stop");
    }

    pub fn send_reply(&self, sender_id: &str, receiver_id: &str, qos: &MessagingQos, reply: Reply, is_local: bool) {
        let built = self.factory.create_reply(sender_id, receiver_id, qos, reply, is_local);
        self.route_logged(built, "reply");
    }

    /// Logs only; the routing entry may already be gone.
    pub fn remove_next_hop(&self, participant_id: &str) {
        if let Err(e) = self.router.remove_next_hop(participant_id) {
            error!(participant_id, error = %e, "could not remove next hop");
        }
    }

    fn route_request(&self, mut message: MutableMessage) -> Result<()> {
        if !message.local_message {
            message.reply_to = self.reply_to_address.clone();
        }
        let message = self.factory.freeze(message).map_err(method_invocation)?;
        trace!(message = %message, "routing request");
        self.router.route(message).map_err(method_invocation)
    }

    fn route_logged(&self, built: Result<MutableMessage>, what: &str) {
        let message = match built {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "could not create {what}");
                return;
            }
        };
        let message = match self.factory.freeze(message) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "could not freeze {what}");
                return;
            }
        };
        let description = message.to_string();
        match self.router.route(message) {
            Ok(()) => debug!(message = %description, "sent {what}"),
            Err(e) => error!(message = %description, error = %e, "could not route {what}"),
        }
    }
}

impl PublicationSender for MessageSender {
    fn send_subscription_reply(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        reply: SubscriptionReply,
    ) {
        let built = self
            .factory
            .create_subscription_reply(sender_id, receiver_id, qos, reply, false);
        self.route_logged(built, "subscription reply");
    }

    fn send_subscription_publication(
        &self,
        sender_id: &str,
        receiver_id: &str,
        qos: &MessagingQos,
        publication: SubscriptionPublication,
    ) {
        let built = self
            .factory
            .create_subscription_publication(sender_id, receiver_id, qos, publication, false);
        self.route_logged(built, "subscription publication");
    }

    fn send_multicast(&self, sender_id: &str, qos: &MessagingQos, publication: MulticastPublication) {
        let built = self
            .factory
            .create_multicast_publication(sender_id, qos, publication);
        self.route_logged(built, "multicast publication");
    }
}
