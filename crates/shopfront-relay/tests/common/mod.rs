//! Shared test helpers for relay integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use shopfront_core::error::DomainError;
use shopfront_core::repository::{OutboxRow, OutboxStore, OutboxTransaction};
use tower::ServiceExt;

use shopfront_relay::routes;
use shopfront_relay::state::AppState;

/// Build the full app router over `outbox`. Uses the same route structure
/// as `main.rs`.
pub fn build_test_app(outbox: Arc<dyn OutboxStore>) -> Router {
    routes::app(AppState::new(outbox))
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// An outbox store whose database is unreachable.
#[derive(Debug)]
pub struct UnreachableOutboxStore;

fn unreachable() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

#[async_trait]
impl OutboxStore for UnreachableOutboxStore {
    async fn pending(&self) -> Result<Vec<OutboxRow>, DomainError> {
        Err(unreachable())
    }

    async fn pending_count(&self) -> Result<u64, DomainError> {
        Err(unreachable())
    }

    async fn begin(&self) -> Result<Box<dyn OutboxTransaction>, DomainError> {
        Err(unreachable())
    }

    async fn update(&self, _row: &OutboxRow) -> Result<(), DomainError> {
        Err(unreachable())
    }
}
