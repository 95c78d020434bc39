//! Integration tests for `PgOutboxStore` and `PgInboxStore`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use shopfront_core::repository::{InboxRow, InboxStore, OutboxRow, OutboxStore};
use shopfront_event_store::{PgInboxStore, PgOutboxStore};
use sqlx::PgPool;
use uuid::Uuid;

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap() + Duration::minutes(minute)
}

fn outbox_row(minute: i64) -> OutboxRow {
    OutboxRow::new(
        Uuid::new_v4(),
        "catalog.product_created",
        r#"{"eventType":"catalog.product_created"}"#,
        at(minute),
    )
}

fn inbox_row(minute: i64) -> InboxRow {
    InboxRow {
        id: Uuid::new_v4(),
        event_type: "catalog.product_created".to_string(),
        payload: r#"{"eventType":"catalog.product_created"}"#.to_string(),
        timestamp: at(minute),
    }
}

async fn insert_committed(store: &PgOutboxStore, row: &OutboxRow) {
    let mut tx = store.begin().await.unwrap();
    tx.insert(row).await.unwrap();
    tx.commit().await.unwrap();
}

// --- outbox ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_committed_insert_is_pending(pool: PgPool) {
    let store = PgOutboxStore::new(pool);
    let row = outbox_row(0);

    insert_committed(&store, &row).await;

    let pending = store.pending().await.unwrap();
    assert_eq!(pending, vec![row]);
    assert_eq!(store.pending_count().await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_dropped_transaction_rolls_back(pool: PgPool) {
    let store = PgOutboxStore::new(pool);

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert(&outbox_row(0)).await.unwrap();
    }

    assert!(store.pending().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_explicit_rollback_discards_update(pool: PgPool) {
    let store = PgOutboxStore::new(pool);
    let row = outbox_row(0);
    insert_committed(&store, &row).await;

    let mut processed = row.clone();
    processed.mark_processed(at(1));
    let mut tx = store.begin().await.unwrap();
    tx.update(&processed).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(store.pending().await.unwrap(), vec![row]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_committed_update_removes_row_from_pending(pool: PgPool) {
    let store = PgOutboxStore::new(pool);
    let row = outbox_row(0);
    insert_committed(&store, &row).await;

    let mut processed = row.clone();
    processed.mark_processed(at(1));
    let mut tx = store.begin().await.unwrap();
    tx.update(&processed).await.unwrap();
    tx.commit().await.unwrap();

    assert!(store.pending().await.unwrap().is_empty());
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_update_outside_transaction_records_error(pool: PgPool) {
    let store = PgOutboxStore::new(pool);
    let mut row = outbox_row(0);
    insert_committed(&store, &row).await;

    row.mark_failed("broker unavailable");
    store.update(&row).await.unwrap();

    let pending = store.pending().await.unwrap();
    assert_eq!(pending[0].error.as_deref(), Some("broker unavailable"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_update_of_missing_row_is_not_found(pool: PgPool) {
    let store = PgOutboxStore::new(pool);

    let result = store.update(&outbox_row(0)).await;

    assert!(matches!(
        result,
        Err(shopfront_core::error::DomainError::NotFound(_))
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_pending_is_ordered_by_occurrence(pool: PgPool) {
    let store = PgOutboxStore::new(pool);
    let late = outbox_row(5);
    let early = outbox_row(1);
    insert_committed(&store, &late).await;
    insert_committed(&store, &early).await;

    let ids: Vec<_> = store.pending().await.unwrap().iter().map(|r| r.id).collect();

    assert_eq!(ids, vec![early.id, late.id]);
}

// --- inbox ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_inbox_returns_oldest_rows_up_to_limit(pool: PgPool) {
    let store = PgInboxStore::new(pool);
    let rows: Vec<_> = [4, 1, 3, 2].into_iter().map(inbox_row).collect();
    for row in &rows {
        store.insert(row).await.unwrap();
    }

    let oldest = store.oldest_pending(2).await.unwrap();

    assert_eq!(oldest, vec![rows[1].clone(), rows[3].clone()]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_inbox_duplicate_insert_is_ignored(pool: PgPool) {
    let store = PgInboxStore::new(pool);
    let row = inbox_row(0);

    store.insert(&row).await.unwrap();
    store.insert(&row).await.unwrap();

    assert_eq!(store.oldest_pending(10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn test_inbox_delete_is_idempotent(pool: PgPool) {
    let store = PgInboxStore::new(pool);
    let row = inbox_row(0);
    store.insert(&row).await.unwrap();

    store.delete(row.id).await.unwrap();
    store.delete(row.id).await.unwrap();

    assert!(store.oldest_pending(10).await.unwrap().is_empty());
}
