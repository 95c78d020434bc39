//! Shared test doubles for the Shopfront services.

mod broker;
mod clock;
mod handler;
mod store;

pub use broker::FailingBroker;
pub use clock::FixedClock;
pub use handler::RecordingHandler;
pub use store::{FailingInboxStore, InMemoryInboxStore, InMemoryOutboxStore};
