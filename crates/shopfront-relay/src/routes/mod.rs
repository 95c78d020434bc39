//! HTTP routes.

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod outbox;

/// Builds the full router. Used by `main.rs` and the integration tests.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/outbox", outbox::router())
        .with_state(state)
}
