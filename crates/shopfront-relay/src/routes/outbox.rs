//! Outbox status endpoint.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Pending outbox rows.
#[derive(Serialize)]
pub struct PendingResponse {
    /// Rows not yet published.
    pub pending: u64,
}

/// GET /api/v1/outbox/pending
async fn pending(State(state): State<AppState>) -> Result<Json<PendingResponse>, ApiError> {
    let pending = state.outbox.pending_count().await?;
    Ok(Json(PendingResponse { pending }))
}

/// Returns the router for the outbox status endpoints.
pub fn router() -> Router<AppState> {
    Router::new().route("/pending", get(pending))
}
