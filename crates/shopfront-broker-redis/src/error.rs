//! Error types for the Redis transport.

use shopfront_messaging::MessagingError;
use thiserror::Error;

/// Redis transport error type.
#[derive(Error, Debug)]
pub enum RedisBrokerError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A reply did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for Redis transport operations.
pub type RedisBrokerResult<T> = Result<T, RedisBrokerError>;

impl From<RedisBrokerError> for MessagingError {
    fn from(error: RedisBrokerError) -> Self {
        MessagingError::Transport(error.to_string())
    }
}
