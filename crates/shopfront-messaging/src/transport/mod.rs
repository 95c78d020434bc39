//! Broker contract consumed by the messaging pipeline.
//!
//! The actual transport (connection, authentication, retry) lives behind
//! [`BrokerConnection`]. Receivers operate in peek-lock mode: every received
//! message must be settled explicitly with `complete`, `abandon` or
//! `dead_letter`.

pub mod in_memory;
pub mod pool;
pub mod subscriber;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shopfront_core::event::{CORRELATION_ID_FIELD, IntegrationEvent};
use shopfront_core::repository::OutboxRow;

use crate::codec::{CodecError, EventCodec};
use crate::error::MessagingError;

/// A message as seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Broker-level id, equal to the event's message id.
    pub message_id: String,
    /// Event type, carried as the message subject.
    pub subject: String,
    /// Correlation id copied from the envelope.
    pub correlation_id: Option<String>,
    /// Serialized envelope.
    pub body: String,
}

impl BrokerMessage {
    /// Builds the broker message for a pending outbox row.
    #[must_use]
    pub fn from_outbox_row(row: &OutboxRow) -> Self {
        let correlation_id = serde_json::from_str::<Value>(&row.payload)
            .ok()
            .and_then(|payload| {
                payload
                    .get(CORRELATION_ID_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            });
        Self {
            message_id: row.id.to_string(),
            subject: row.event_type.clone(),
            correlation_id,
            body: row.payload.clone(),
        }
    }

    /// Serializes an event straight into a broker message.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if the event cannot be serialized.
    pub fn from_event<E: IntegrationEvent>(codec: &EventCodec, event: &E) -> Result<Self, CodecError> {
        let metadata = event.metadata();
        Ok(Self {
            message_id: metadata.message_id.to_string(),
            subject: metadata.event_type.clone(),
            correlation_id: metadata.correlation_id.clone(),
            body: codec.serialize(event)?,
        })
    }
}

/// Receive-loop tuning.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Maximum receive callbacks running at once.
    pub max_concurrent_calls: usize,
    /// Maximum messages fetched per receive call.
    pub prefetch_count: usize,
    /// How long a received message stays locked to this consumer before the
    /// broker may hand it to another one.
    pub lock_renewal: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 10,
            prefetch_count: 20,
            lock_renewal: Duration::from_secs(300),
        }
    }
}

/// Sends messages to one topic.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Publishes one message.
    async fn send(&self, message: BrokerMessage) -> Result<(), MessagingError>;
}

/// Settles one received message.
#[async_trait]
pub trait MessageSettlement: Send + Sync {
    /// Removes the message from the subscription.
    async fn complete(&self) -> Result<(), MessagingError>;

    /// Releases the lock so the broker redelivers the message later.
    async fn abandon(&self) -> Result<(), MessagingError>;

    /// Moves the message to the dead-letter queue. Terminal.
    async fn dead_letter(&self, reason: &str, description: &str) -> Result<(), MessagingError>;
}

/// A locked message awaiting settlement.
pub struct ReceivedMessage {
    /// The message.
    pub message: BrokerMessage,
    /// Settlement handle bound to the message's lock.
    pub settlement: Box<dyn MessageSettlement>,
}

impl std::fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Pulls messages from one subscription.
#[async_trait]
pub trait MessageReceiver: Send {
    /// Waits a bounded, implementation-defined time for up to
    /// `max_messages` messages. Returns an empty batch on timeout.
    async fn receive(&mut self, max_messages: usize) -> Result<Vec<ReceivedMessage>, MessagingError>;
}

/// Factory for topic senders and subscription receivers.
pub trait BrokerConnection: Send + Sync {
    /// Creates a sender for `topic`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Transport` if the client cannot be built.
    fn create_sender(&self, topic: &str) -> Result<Arc<dyn MessageSender>, MessagingError>;

    /// Creates a peek-lock receiver for `subscription` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Transport` if the client cannot be built.
    fn create_receiver(
        &self,
        topic: &str,
        subscription: &str,
        options: &ProcessorOptions,
    ) -> Result<Box<dyn MessageReceiver>, MessagingError>;
}
