//! Shared application state.

use std::fmt;
use std::sync::Arc;

use shopfront_core::repository::OutboxStore;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Outbox store queried by the status endpoints.
    pub outbox: Arc<dyn OutboxStore>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(outbox: Arc<dyn OutboxStore>) -> Self {
        Self { outbox }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
