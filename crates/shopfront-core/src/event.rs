//! Integration event abstractions.
//!
//! Every event that crosses a service boundary carries an [`EventMetadata`]
//! envelope which is flattened into the event's JSON body:
//!
//! ```json
//! {"messageId": "...", "eventType": "catalog.product_created",
//!  "occurredAtUtc": "2026-01-15T10:00:00Z", "correlationId": null, ...}
//! ```
//!
//! The `eventType` discriminator is what the codec reads before it knows
//! which concrete type to deserialize into.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the discriminator field on the wire.
pub const EVENT_TYPE_FIELD: &str = "eventType";

/// Name of the correlation field on the wire.
pub const CORRELATION_ID_FIELD: &str = "correlationId";

/// Routing and identity metadata attached to every integration event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Globally unique message identifier, generated at construction.
    pub message_id: Uuid,
    /// Type discriminator used to select the concrete type on decode.
    pub event_type: String,
    /// When the business fact occurred.
    pub occurred_at_utc: DateTime<Utc>,
    /// Optional correlation identifier propagated for tracing.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl EventMetadata {
    /// Creates metadata with a freshly generated message id.
    #[must_use]
    pub fn new(
        event_type: &str,
        occurred_at_utc: DateTime<Utc>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            occurred_at_utc,
            correlation_id,
        }
    }

    /// Creates metadata for the concrete event type `E`.
    #[must_use]
    pub fn for_event<E: IntegrationEvent>(
        occurred_at_utc: DateTime<Utc>,
        correlation_id: Option<String>,
    ) -> Self {
        Self::new(E::EVENT_TYPE, occurred_at_utc, correlation_id)
    }
}

/// Trait implemented by every concrete, serializable integration event.
pub trait IntegrationEvent:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// The discriminator written to `eventType`. Must be non-empty.
    const EVENT_TYPE: &'static str;

    /// Returns the envelope metadata for this event.
    fn metadata(&self) -> &EventMetadata;
}

/// Object-safe view over a decoded event whose concrete type is only known
/// at runtime.
pub trait DomainEvent: fmt::Debug + Send + Sync {
    /// Returns the envelope metadata.
    fn envelope(&self) -> &EventMetadata;

    /// Returns the type discriminator.
    fn event_type(&self) -> &str {
        &self.envelope().event_type
    }

    /// Returns the message identifier.
    fn message_id(&self) -> Uuid {
        self.envelope().message_id
    }

    /// Upcast used by the dispatcher to recover the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Serializes the full event (envelope and body) to JSON text.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the event cannot be serialized.
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

impl<E: IntegrationEvent> DomainEvent for E {
    fn envelope(&self) -> &EventMetadata {
        self.metadata()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
