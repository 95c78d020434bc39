//! Redis Streams transport.
//!
//! A topic is a stream key and a subscription is a consumer group on it.
//! Unacknowledged entries stay in the group's pending list, which gives the
//! peek-lock semantics the receive loop relies on.

mod broker;
mod error;
mod stream;

pub use broker::{RedisBroker, RedisBrokerConfig};
pub use error::{RedisBrokerError, RedisBrokerResult};
