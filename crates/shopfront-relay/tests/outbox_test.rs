//! Integration tests for the outbox status endpoint.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use shopfront_core::repository::OutboxRow;
use shopfront_test_support::InMemoryOutboxStore;
use uuid::Uuid;

fn row() -> OutboxRow {
    OutboxRow::new(
        Uuid::new_v4(),
        "catalog.product_created",
        "{}",
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    )
}

#[tokio::test]
async fn test_pending_counts_unpublished_rows() {
    let store = InMemoryOutboxStore::new();
    let mut published = row();
    published.mark_processed(Utc::now());
    store.seed([row(), row(), published]);
    let app = common::build_test_app(Arc::new(store));

    let (status, json) = common::get_json(app, "/api/v1/outbox/pending").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pending"], 2);
}

#[tokio::test]
async fn test_pending_is_zero_for_empty_outbox() {
    let app = common::build_test_app(Arc::new(InMemoryOutboxStore::new()));

    let (status, json) = common::get_json(app, "/api/v1/outbox/pending").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pending"], 0);
}

#[tokio::test]
async fn test_store_failure_returns_500() {
    let app = common::build_test_app(Arc::new(common::UnreachableOutboxStore));

    let (status, json) = common::get_json(app, "/api/v1/outbox/pending").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "infrastructure_error");
}
