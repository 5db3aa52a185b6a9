use std::sync::Arc;

use switchyard::config::load_config;
use switchyard::dispatcher::Dispatcher;
use switchyard::factory::MessageFactory;
use switchyard::payload::JsonCodec;
use switchyard::persistence::{SledStore, SubscriptionStore};
use switchyard::provider::InterpreterRegistry;
use switchyard::publication::PublicationManager;
use switchyard::router::LocalMessageRouter;
use switchyard::sender::{MessageSender, PublicationSender};
use switchyard::subscription::SubscriptionDirectory;
use switchyard::utils::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let router = Arc::new(LocalMessageRouter::new());
    let factory = MessageFactory::new(settings.messaging.ttl_uplift_ms, Arc::new(JsonCodec));
    let sender = Arc::new(MessageSender::new(
        factory,
        router.clone(),
        &settings.messaging.reply_to_address,
    ));
    let interpreters = Arc::new(InterpreterRegistry::new());
    let dispatcher = Dispatcher::new(sender.clone(), interpreters.clone());
    sender.register_dispatcher(&dispatcher);

    let store: Option<Arc<dyn SubscriptionStore>> =
        match SledStore::open(&settings.publication.storage_path) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                error!(path = %settings.publication.storage_path, error = %e, "subscriptions will not be persisted");
                None
            }
        };

    let publication_sender: Arc<dyn PublicationSender> = sender.clone();
    let publication_manager = PublicationManager::new(
        &settings,
        interpreters,
        store,
        Arc::downgrade(&publication_sender),
    );
    dispatcher.register_publication_manager(&publication_manager);
    dispatcher.register_subscription_manager(Arc::new(SubscriptionDirectory::new()));
    publication_manager.load_persisted_subscriptions();

    info!("switchyard runtime ready");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "could not listen for shutdown signal");
    }

    info!("shutting down");
    publication_manager.shutdown();
    dispatcher.shutdown();
}
