//! Shopfront Relay: the process that moves events between the database
//! and the broker.
//!
//! It publishes pending outbox rows, stores received messages in the inbox,
//! dispatches inbox rows to the cart handlers, and serves a small health
//! and status API.

pub mod config;
pub mod error;
pub mod routes;
pub mod runtime;
pub mod state;
