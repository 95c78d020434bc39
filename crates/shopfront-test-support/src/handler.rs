//! Event handler doubles.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shopfront_core::error::DomainError;
use shopfront_core::event::IntegrationEvent;
use shopfront_messaging::{EventHandler, ShutdownSignal};
use uuid::Uuid;

/// A handler that records the message id of every event it sees. Clones
/// share the same record.
///
/// Events whose id was passed to [`fail_for`](Self::fail_for) are recorded
/// and then rejected with a validation error.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<Uuid>>>,
    fail_for: Arc<Mutex<HashSet<Uuid>>>,
}

impl RecordingHandler {
    /// Creates a handler that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the handler fail for the event with `message_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_for(&self, message_id: Uuid) {
        self.fail_for.lock().unwrap().insert(message_id);
    }

    /// Lets the event with `message_id` succeed again.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn heal(&self, message_id: Uuid) {
        self.fail_for.lock().unwrap().remove(&message_id);
    }

    /// Returns every message id seen so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn seen(&self) -> Vec<Uuid> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl<E: IntegrationEvent> EventHandler<E> for RecordingHandler {
    async fn handle(&self, event: &E, _shutdown: &ShutdownSignal) -> Result<(), DomainError> {
        let message_id = event.metadata().message_id;
        self.seen.lock().unwrap().push(message_id);
        if self.fail_for.lock().unwrap().contains(&message_id) {
            return Err(DomainError::Validation(format!("rejected {message_id}")));
        }
        Ok(())
    }
}
