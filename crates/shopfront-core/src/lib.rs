//! Shopfront Core: shared event and store abstractions.
//!
//! This crate defines the event envelope, the outbox and inbox row types,
//! and the store ports that the messaging pipeline depends on. It contains
//! no infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod repository;
