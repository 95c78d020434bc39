//! Shopfront Messaging: at-least-once event delivery.
//!
//! Producer side: command handlers write [`OutboxRow`]s in the same
//! transaction as their state change, and the [`OutboxPublisher`] later
//! forwards pending rows to the broker. Consumer side: the
//! [`SubscriberClient`] receive callback decodes broker messages into
//! [`InboxRow`]s, and the [`InboxPoller`] feeds them to the [`Dispatcher`].
//!
//! [`OutboxRow`]: shopfront_core::repository::OutboxRow
//! [`InboxRow`]: shopfront_core::repository::InboxRow

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod inbox_poller;
pub mod outbox_publisher;
pub mod shutdown;
pub mod transport;

pub use codec::{CodecError, EventCodec, TypeRegistry};
pub use dispatcher::{DispatchOutcome, Dispatcher, EventHandler};
pub use error::MessagingError;
pub use inbox_poller::{InboxPoller, InboxPollerConfig, InboxSweepReport};
pub use outbox_publisher::{OutboxPublisher, OutboxPublisherConfig, OutboxSweepReport};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use transport::in_memory::InMemoryBroker;
pub use transport::pool::{PublisherClient, SubscriptionKey, TransportClientPool};
pub use transport::subscriber::{InboxIngest, IngestOutcome, SubscriberClient};
pub use transport::{BrokerConnection, BrokerMessage, ProcessorOptions};
