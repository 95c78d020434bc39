//! Domain error types.

use thiserror::Error;

/// Top-level domain error type shared by stores and event handlers.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced entity or row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
