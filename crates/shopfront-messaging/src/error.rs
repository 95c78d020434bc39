//! Messaging error taxonomy.

use shopfront_core::error::DomainError;
use thiserror::Error;

use crate::codec::CodecError;

/// Errors raised by the messaging pipeline.
///
/// Only `DuplicateHandler`, `Configuration` and codec registration failures
/// are expected to escape to startup code. Everything else is handled per
/// item inside the sweep and receive loops.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Encoding, decoding or type registration failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A second handler was registered for an already-bound event type.
    #[error("a handler is already registered for event type {event_type}")]
    DuplicateHandler {
        /// The event type discriminator.
        event_type: &'static str,
    },

    /// A required setting is missing or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The broker rejected or failed an operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// An outbox or inbox store operation failed.
    #[error("persistence error: {0}")]
    Persistence(#[source] DomainError),

    /// A business handler failed while handling an event.
    #[error("handler failed: {0}")]
    Handler(#[source] DomainError),

    /// The operation was interrupted by shutdown.
    #[error("operation cancelled by shutdown")]
    Cancelled,
}
