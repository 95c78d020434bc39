//! Assembles the messaging pipeline and runs its background loops.

use std::sync::Arc;

use shopfront_cart::{CartPriceBook, register_cart_handlers};
use shopfront_core::clock::Clock;
use shopfront_core::repository::{InboxStore, OutboxStore};
use shopfront_messaging::{
    BrokerConnection, Dispatcher, EventCodec, InboxIngest, InboxPoller, MessagingError,
    OutboxPublisher, ShutdownSignal, SubscriberClient, TransportClientPool,
};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::error::AppError;

/// Infrastructure the relay runs on top of.
#[derive(Clone)]
pub struct RelayPorts {
    /// Outbox table.
    pub outbox: Arc<dyn OutboxStore>,
    /// Inbox table.
    pub inbox: Arc<dyn InboxStore>,
    /// Message broker.
    pub broker: Arc<dyn BrokerConnection>,
    /// Time source for bookkeeping columns.
    pub clock: Arc<dyn Clock>,
}

/// A fully wired relay that has not started yet.
pub struct Relay {
    pool: Arc<TransportClientPool>,
    publisher: OutboxPublisher,
    poller: InboxPoller,
    subscriber: Option<Arc<SubscriberClient>>,
    price_book: Arc<CartPriceBook>,
}

impl Relay {
    /// Builds the codec, dispatcher and client pool, and binds the cart
    /// handlers on the configured subscription.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Messaging` if event registration, handler binding
    /// or the publisher configuration fails.
    pub async fn build(config: &RelayConfig, ports: RelayPorts) -> Result<Self, AppError> {
        let codec = EventCodec::with_events(shopfront_catalog::register_events)
            .map_err(MessagingError::from)?;
        let codec = Arc::new(codec);
        let dispatcher = Arc::new(Dispatcher::new());
        let ingest = Arc::new(InboxIngest::new(
            Arc::clone(&codec),
            Arc::clone(&dispatcher),
            Arc::clone(&ports.inbox),
            Arc::clone(&ports.clock),
        ));
        let pool = Arc::new(
            TransportClientPool::new(ports.broker).with_inbox(ingest, config.processor.clone()),
        );

        let price_book = Arc::new(CartPriceBook::new());
        let subscriber = match &config.subscription {
            Some(key) => {
                let subscriber = pool.subscriber(&key.topic, &key.subscription).await?;
                register_cart_handlers(&subscriber, Arc::clone(&price_book))?;
                Some(subscriber)
            }
            None => None,
        };

        let publisher = OutboxPublisher::new(
            ports.outbox,
            Arc::clone(&pool),
            ports.clock,
            config.outbox.clone(),
        )?;
        let poller = InboxPoller::new(ports.inbox, codec, dispatcher, config.inbox.clone());

        Ok(Self {
            pool,
            publisher,
            poller,
            subscriber,
            price_book,
        })
    }

    /// The cart read model fed by this relay.
    #[must_use]
    pub fn price_book(&self) -> Arc<CartPriceBook> {
        Arc::clone(&self.price_book)
    }

    /// Starts the subscriber and spawns the publisher and poller loops.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Messaging` if the subscriber cannot start.
    pub async fn start(self, shutdown: ShutdownSignal) -> Result<RelayHandle, AppError> {
        if let Some(subscriber) = &self.subscriber {
            subscriber.start_processing().await?;
            info!(
                topic = subscriber.topic(),
                subscription = subscriber.subscription(),
                "Subscriber started"
            );
        }
        let tasks = vec![
            tokio::spawn(self.publisher.run(shutdown.clone())),
            tokio::spawn(self.poller.run(shutdown)),
        ];
        Ok(RelayHandle {
            pool: self.pool,
            tasks,
        })
    }
}

/// Running relay loops.
pub struct RelayHandle {
    pool: Arc<TransportClientPool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    /// Waits for the loops to exit after the shutdown signal fired, then
    /// stops every subscriber.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background loop panicked");
            }
        }
        self.pool.stop_all().await;
        info!("Relay stopped");
    }
}
