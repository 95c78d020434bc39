//! Outbox and inbox rows and the store ports that persist them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Persisted projection of an outgoing event plus delivery bookkeeping.
///
/// Rows are append-only: they are inserted by the unit of work that changed
/// business state and afterwards only mutated by the outbox publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRow {
    /// Equal to the event's message id.
    pub id: Uuid,
    /// Event type discriminator.
    pub event_type: String,
    /// Serialized envelope.
    pub payload: String,
    /// When the business fact occurred.
    pub occurred_at_utc: DateTime<Utc>,
    /// Whether the row reached the broker.
    pub processed: bool,
    /// When the row was published. Set iff `processed`.
    pub processed_at_utc: Option<DateTime<Utc>>,
    /// Last publish failure, cleared on success.
    pub error: Option<String>,
}

impl OutboxRow {
    /// Creates a pending row.
    #[must_use]
    pub fn new(
        id: Uuid,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        occurred_at_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            payload: payload.into(),
            occurred_at_utc,
            processed: false,
            processed_at_utc: None,
            error: None,
        }
    }

    /// Marks the row as published at `now`, clearing any previous error.
    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.processed = true;
        self.processed_at_utc = Some(now);
        self.error = None;
    }

    /// Returns the row to pending with the failure message recorded.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.processed = false;
        self.processed_at_utc = None;
        self.error = Some(error.into());
    }
}

/// Persisted record of a received-but-not-yet-handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxRow {
    /// Equal to the event's message id.
    pub id: Uuid,
    /// Event type discriminator. Authoritative over the payload's own field.
    pub event_type: String,
    /// Serialized envelope as received.
    pub payload: String,
    /// When the message was accepted from the broker.
    pub timestamp: DateTime<Utc>,
}

/// Store for outbox rows.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Loads every row with `processed = false`, oldest first.
    async fn pending(&self) -> Result<Vec<OutboxRow>, DomainError>;

    /// Counts rows with `processed = false`.
    async fn pending_count(&self) -> Result<u64, DomainError>;

    /// Opens a transaction. Dropping the handle without calling
    /// [`OutboxTransaction::commit`] rolls back every write made through it.
    async fn begin(&self) -> Result<Box<dyn OutboxTransaction>, DomainError>;

    /// Writes the row's delivery columns outside any transaction.
    async fn update(&self, row: &OutboxRow) -> Result<(), DomainError>;
}

/// Explicit transaction boundary over the outbox table.
#[async_trait]
pub trait OutboxTransaction: Send {
    /// Inserts a new row. Used by producers in the same unit of work as the
    /// business state change.
    async fn insert(&mut self, row: &OutboxRow) -> Result<(), DomainError>;

    /// Writes the row's delivery columns.
    async fn update(&mut self, row: &OutboxRow) -> Result<(), DomainError>;

    /// Makes every write visible.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards every write. Equivalent to dropping the handle.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// Store for inbox rows.
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Inserts a row. A row with the same id already present is left as is,
    /// so broker redelivery never duplicates inbox work.
    async fn insert(&self, row: &InboxRow) -> Result<(), DomainError>;

    /// Returns up to `limit` rows ordered by `timestamp` ascending.
    async fn oldest_pending(&self, limit: usize) -> Result<Vec<InboxRow>, DomainError>;

    /// Deletes the row with the given id. Deleting a missing row is not an
    /// error.
    async fn delete(&self, id: Uuid) -> Result<(), DomainError>;
}
