//! `PostgreSQL` implementation of the `InboxStore` port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use shopfront_core::error::DomainError;
use shopfront_core::repository::{InboxRow, InboxStore};

use crate::infrastructure;

#[derive(sqlx::FromRow)]
struct InboxRecord {
    id: Uuid,
    event_type: String,
    payload: String,
    timestamp: DateTime<Utc>,
}

/// PostgreSQL-backed inbox store.
#[derive(Debug, Clone)]
pub struct PgInboxStore {
    pool: PgPool,
}

impl PgInboxStore {
    /// Creates a new `PgInboxStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxStore for PgInboxStore {
    async fn insert(&self, row: &InboxRow) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO inbox_messages (id, event_type, payload, timestamp)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(row.id)
        .bind(&row.event_type)
        .bind(&row.payload)
        .bind(row.timestamp)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }

    async fn oldest_pending(&self, limit: usize) -> Result<Vec<InboxRow>, DomainError> {
        let records = sqlx::query_as::<_, InboxRecord>(
            r"
            SELECT id, event_type, payload, timestamp
            FROM inbox_messages
            ORDER BY timestamp ASC
            LIMIT $1
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(records
            .into_iter()
            .map(|record| InboxRow {
                id: record.id,
                event_type: record.event_type,
                payload: record.payload,
                timestamp: record.timestamp,
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM inbox_messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}
