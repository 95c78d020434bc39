//! `PostgreSQL` implementation of the `OutboxStore` port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use shopfront_core::error::DomainError;
use shopfront_core::repository::{OutboxRow, OutboxStore, OutboxTransaction};

use crate::infrastructure;

const INSERT_ROW: &str = r"
INSERT INTO outbox_messages
    (id, event_type, payload, occurred_at_utc, processed, processed_at_utc, error)
VALUES ($1, $2, $3, $4, $5, $6, $7)
";

const UPDATE_DELIVERY: &str = r"
UPDATE outbox_messages
SET processed = $2, processed_at_utc = $3, error = $4
WHERE id = $1
";

#[derive(sqlx::FromRow)]
struct OutboxRecord {
    id: Uuid,
    event_type: String,
    payload: String,
    occurred_at_utc: DateTime<Utc>,
    processed: bool,
    processed_at_utc: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl From<OutboxRecord> for OutboxRow {
    fn from(record: OutboxRecord) -> Self {
        Self {
            id: record.id,
            event_type: record.event_type,
            payload: record.payload,
            occurred_at_utc: record.occurred_at_utc,
            processed: record.processed,
            processed_at_utc: record.processed_at_utc,
            error: record.error,
        }
    }
}

fn not_found(id: Uuid) -> DomainError {
    DomainError::NotFound(format!("outbox row {id}"))
}

/// PostgreSQL-backed outbox store.
#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    /// Creates a new `PgOutboxStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn pending(&self) -> Result<Vec<OutboxRow>, DomainError> {
        let records = sqlx::query_as::<_, OutboxRecord>(
            r"
            SELECT id, event_type, payload, occurred_at_utc, processed, processed_at_utc, error
            FROM outbox_messages
            WHERE processed = FALSE
            ORDER BY occurred_at_utc ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(records.into_iter().map(OutboxRow::from).collect())
    }

    async fn pending_count(&self) -> Result<u64, DomainError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_messages WHERE processed = FALSE")
                .fetch_one(&self.pool)
                .await
                .map_err(infrastructure)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn OutboxTransaction>, DomainError> {
        let tx = self.pool.begin().await.map_err(infrastructure)?;
        Ok(Box::new(PgOutboxTransaction { tx }))
    }

    async fn update(&self, row: &OutboxRow) -> Result<(), DomainError> {
        let result = sqlx::query(UPDATE_DELIVERY)
            .bind(row.id)
            .bind(row.processed)
            .bind(row.processed_at_utc)
            .bind(row.error.as_deref())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        if result.rows_affected() == 0 {
            return Err(not_found(row.id));
        }
        Ok(())
    }
}

/// A database transaction over the outbox table. Dropping it without
/// committing rolls back.
pub struct PgOutboxTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OutboxTransaction for PgOutboxTransaction {
    async fn insert(&mut self, row: &OutboxRow) -> Result<(), DomainError> {
        sqlx::query(INSERT_ROW)
            .bind(row.id)
            .bind(&row.event_type)
            .bind(&row.payload)
            .bind(row.occurred_at_utc)
            .bind(row.processed)
            .bind(row.processed_at_utc)
            .bind(row.error.as_deref())
            .execute(&mut *self.tx)
            .await
            .map_err(infrastructure)?;
        debug!(message_id = %row.id, event_type = %row.event_type, "staged outbox row");
        Ok(())
    }

    async fn update(&mut self, row: &OutboxRow) -> Result<(), DomainError> {
        let result = sqlx::query(UPDATE_DELIVERY)
            .bind(row.id)
            .bind(row.processed)
            .bind(row.processed_at_utc)
            .bind(row.error.as_deref())
            .execute(&mut *self.tx)
            .await
            .map_err(infrastructure)?;
        if result.rows_affected() == 0 {
            return Err(not_found(row.id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(infrastructure)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(infrastructure)
    }
}
