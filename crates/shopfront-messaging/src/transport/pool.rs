//! Lazily constructed publisher and subscriber clients, one per key.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::subscriber::{InboxIngest, SubscriberClient};
use super::{BrokerConnection, BrokerMessage, MessageSender, ProcessorOptions};
use crate::error::MessagingError;

/// Sends messages to one topic.
pub struct PublisherClient {
    topic: String,
    sender: Arc<dyn MessageSender>,
}

impl std::fmt::Debug for PublisherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherClient")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl PublisherClient {
    /// The topic this client publishes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes one message.
    ///
    /// # Errors
    ///
    /// Returns whatever the broker sender reports, typically
    /// `MessagingError::Transport`.
    pub async fn publish(&self, message: BrokerMessage) -> Result<(), MessagingError> {
        debug!(
            topic = %self.topic,
            message_id = %message.message_id,
            subject = %message.subject,
            "publishing message"
        );
        self.sender.send(message).await
    }
}

/// Cache key for subscriber clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Topic name.
    pub topic: String,
    /// Subscription name.
    pub subscription: String,
}

/// Hands out one shared client per topic (publishers) or per
/// topic and subscription pair (subscribers).
pub struct TransportClientPool {
    broker: Arc<dyn BrokerConnection>,
    inbox: Option<Arc<InboxIngest>>,
    options: ProcessorOptions,
    publishers: RwLock<HashMap<String, Arc<PublisherClient>>>,
    subscribers: RwLock<HashMap<SubscriptionKey, Arc<SubscriberClient>>>,
}

impl std::fmt::Debug for TransportClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClientPool")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TransportClientPool {
    /// Creates a pool that can only hand out publishers until
    /// [`with_inbox`](Self::with_inbox) is called.
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerConnection>) -> Self {
        Self {
            broker,
            inbox: None,
            options: ProcessorOptions::default(),
            publishers: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Enables subscribers, which write received messages through `ingest`.
    #[must_use]
    pub fn with_inbox(mut self, ingest: Arc<InboxIngest>, options: ProcessorOptions) -> Self {
        self.inbox = Some(ingest);
        self.options = options;
        self
    }

    /// Returns the publisher for `topic`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Configuration` for a blank topic, or the
    /// broker's error if the sender cannot be created.
    pub async fn publisher(&self, topic: &str) -> Result<Arc<PublisherClient>, MessagingError> {
        require_name("topic", topic)?;

        if let Some(client) = self.publishers.read().await.get(topic) {
            return Ok(Arc::clone(client));
        }

        let mut publishers = self.publishers.write().await;
        match publishers.entry(topic.to_owned()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                let sender = self.broker.create_sender(topic)?;
                info!(%topic, "created publisher client");
                let client = Arc::new(PublisherClient {
                    topic: topic.to_owned(),
                    sender,
                });
                Ok(Arc::clone(slot.insert(client)))
            }
        }
    }

    /// Returns the subscriber for `subscription` on `topic`, creating it on
    /// first use. The client is returned stopped.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Configuration` for a blank name or when the
    /// pool has no inbox to write to.
    pub async fn subscriber(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<Arc<SubscriberClient>, MessagingError> {
        require_name("topic", topic)?;
        require_name("subscription", subscription)?;
        let key = SubscriptionKey {
            topic: topic.to_owned(),
            subscription: subscription.to_owned(),
        };

        if let Some(client) = self.subscribers.read().await.get(&key) {
            return Ok(Arc::clone(client));
        }

        let ingest = self.inbox.as_ref().ok_or_else(|| {
            MessagingError::Configuration("subscriber requested but no inbox is configured".into())
        })?;

        let mut subscribers = self.subscribers.write().await;
        match subscribers.entry(key) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                info!(%topic, %subscription, "created subscriber client");
                let client = Arc::new(SubscriberClient::new(
                    topic.to_owned(),
                    subscription.to_owned(),
                    Arc::clone(&self.broker),
                    self.options.clone(),
                    Arc::clone(ingest),
                ));
                Ok(Arc::clone(slot.insert(client)))
            }
        }
    }

    /// Number of publisher clients created so far.
    pub async fn publisher_count(&self) -> usize {
        self.publishers.read().await.len()
    }

    /// Number of subscriber clients created so far.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Stops every subscriber's receive loop.
    pub async fn stop_all(&self) {
        let subscribers: Vec<_> = self.subscribers.read().await.values().cloned().collect();
        for subscriber in subscribers {
            subscriber.stop_processing().await;
        }
    }
}

fn require_name(what: &str, value: &str) -> Result<(), MessagingError> {
    if value.trim().is_empty() {
        return Err(MessagingError::Configuration(format!("{what} must not be empty")));
    }
    Ok(())
}
