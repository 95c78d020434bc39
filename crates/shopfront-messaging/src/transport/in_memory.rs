//! In-process broker for tests and single-process runs.
//!
//! Each topic fans out to its subscriptions; a message published before a
//! subscription exists is not delivered to it. Settlement is recorded so
//! tests can assert on completions and dead letters.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{
    BrokerConnection, BrokerMessage, MessageReceiver, MessageSender, MessageSettlement,
    ProcessorOptions, ReceivedMessage,
};
use crate::error::MessagingError;

const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_millis(250);

/// A dead-lettered message with the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// The rejected message.
    pub message: BrokerMessage,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable detail.
    pub description: String,
}

#[derive(Default)]
struct SubscriptionQueue {
    ready: Mutex<VecDeque<BrokerMessage>>,
    notify: Notify,
    completed: Mutex<Vec<String>>,
    abandoned: Mutex<Vec<String>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl SubscriptionQueue {
    fn push_back(&self, message: BrokerMessage) {
        lock(&self.ready).push_back(message);
        self.notify.notify_one();
    }

    fn push_front(&self, message: BrokerMessage) {
        lock(&self.ready).push_front(message);
        self.notify.notify_one();
    }

    fn take(&self, max: usize) -> Vec<BrokerMessage> {
        let mut ready = lock(&self.ready);
        let count = max.min(ready.len());
        ready.drain(..count).collect()
    }
}

#[derive(Default)]
struct TopicState {
    published: Vec<BrokerMessage>,
    subscriptions: HashMap<String, Arc<SubscriptionQueue>>,
}

/// Process-local implementation of [`BrokerConnection`].
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
    receive_wait: Option<Duration>,
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker").finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long an empty `receive` waits before returning.
    #[must_use]
    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = Some(wait);
        self
    }

    /// Creates the subscription if it does not exist yet.
    pub fn ensure_subscription(&self, topic: &str, subscription: &str) {
        self.queue(topic, subscription);
    }

    fn queue(&self, topic: &str, subscription: &str) -> Arc<SubscriptionQueue> {
        let mut topics = lock(&self.topics);
        let state = topics.entry(topic.to_owned()).or_default();
        Arc::clone(
            state
                .subscriptions
                .entry(subscription.to_owned())
                .or_default(),
        )
    }

    fn existing_queue(&self, topic: &str, subscription: &str) -> Option<Arc<SubscriptionQueue>> {
        lock(&self.topics)
            .get(topic)
            .and_then(|state| state.subscriptions.get(subscription))
            .cloned()
    }

    fn deliver(&self, topic: &str, message: BrokerMessage) {
        let mut topics = lock(&self.topics);
        let state = topics.entry(topic.to_owned()).or_default();
        for queue in state.subscriptions.values() {
            queue.push_back(message.clone());
        }
        state.published.push(message);
    }

    /// Every message ever published to `topic`.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<BrokerMessage> {
        lock(&self.topics)
            .get(topic)
            .map(|state| state.published.clone())
            .unwrap_or_default()
    }

    /// Ids of messages completed on the subscription.
    #[must_use]
    pub fn completed(&self, topic: &str, subscription: &str) -> Vec<String> {
        self.existing_queue(topic, subscription)
            .map(|queue| lock(&queue.completed).clone())
            .unwrap_or_default()
    }

    /// Ids of messages abandoned on the subscription, once per abandon.
    #[must_use]
    pub fn abandoned(&self, topic: &str, subscription: &str) -> Vec<String> {
        self.existing_queue(topic, subscription)
            .map(|queue| lock(&queue.abandoned).clone())
            .unwrap_or_default()
    }

    /// Messages dead-lettered on the subscription.
    #[must_use]
    pub fn dead_letters(&self, topic: &str, subscription: &str) -> Vec<DeadLetter> {
        self.existing_queue(topic, subscription)
            .map(|queue| lock(&queue.dead_letters).clone())
            .unwrap_or_default()
    }

    /// Messages waiting to be received on the subscription.
    #[must_use]
    pub fn ready_count(&self, topic: &str, subscription: &str) -> usize {
        self.existing_queue(topic, subscription)
            .map_or(0, |queue| lock(&queue.ready).len())
    }
}

struct InMemorySender {
    broker: InMemoryBroker,
    topic: String,
}

#[async_trait]
impl MessageSender for InMemorySender {
    async fn send(&self, message: BrokerMessage) -> Result<(), MessagingError> {
        self.broker.deliver(&self.topic, message);
        Ok(())
    }
}

struct InMemoryReceiver {
    queue: Arc<SubscriptionQueue>,
    wait: Duration,
}

#[async_trait]
impl MessageReceiver for InMemoryReceiver {
    async fn receive(&mut self, max_messages: usize) -> Result<Vec<ReceivedMessage>, MessagingError> {
        loop {
            let batch = self.queue.take(max_messages.max(1));
            if !batch.is_empty() {
                return Ok(batch
                    .into_iter()
                    .map(|message| ReceivedMessage {
                        settlement: Box::new(InMemorySettlement {
                            queue: Arc::clone(&self.queue),
                            message: message.clone(),
                        }),
                        message,
                    })
                    .collect());
            }
            if tokio::time::timeout(self.wait, self.queue.notify.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }
}

struct InMemorySettlement {
    queue: Arc<SubscriptionQueue>,
    message: BrokerMessage,
}

#[async_trait]
impl MessageSettlement for InMemorySettlement {
    async fn complete(&self) -> Result<(), MessagingError> {
        lock(&self.queue.completed).push(self.message.message_id.clone());
        Ok(())
    }

    async fn abandon(&self) -> Result<(), MessagingError> {
        lock(&self.queue.abandoned).push(self.message.message_id.clone());
        self.queue.push_front(self.message.clone());
        Ok(())
    }

    async fn dead_letter(&self, reason: &str, description: &str) -> Result<(), MessagingError> {
        lock(&self.queue.dead_letters).push(DeadLetter {
            message: self.message.clone(),
            reason: reason.to_owned(),
            description: description.to_owned(),
        });
        Ok(())
    }
}

impl BrokerConnection for InMemoryBroker {
    fn create_sender(&self, topic: &str) -> Result<Arc<dyn MessageSender>, MessagingError> {
        Ok(Arc::new(InMemorySender {
            broker: self.clone(),
            topic: topic.to_owned(),
        }))
    }

    fn create_receiver(
        &self,
        topic: &str,
        subscription: &str,
        _options: &ProcessorOptions,
    ) -> Result<Box<dyn MessageReceiver>, MessagingError> {
        Ok(Box::new(InMemoryReceiver {
            queue: self.queue(topic, subscription),
            wait: self.receive_wait.unwrap_or(DEFAULT_RECEIVE_WAIT),
        }))
    }
}
