//! Event codec and type registry.
//!
//! The registry maps an `eventType` discriminator to the concrete Rust type
//! that decodes it. Decoding is two-phase: the payload is first parsed as a
//! generic JSON value to read the discriminator, then the value is
//! deserialized into the registered type.
//!
//! Bounded contexts expose a static registration list (a plain function
//! calling [`TypeRegistry::register`] for each event type) that the process
//! runs at startup.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use shopfront_core::event::{DomainEvent, EVENT_TYPE_FIELD, IntegrationEvent};
use thiserror::Error;
use tracing::{debug, warn};

/// Codec and registration errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The event carries an empty discriminator.
    #[error("event type must not be empty")]
    EmptyEventType,

    /// The discriminator is already bound and `force` was not set.
    #[error("event type {event_type} is already registered")]
    AlreadyRegistered {
        /// The discriminator.
        event_type: String,
    },

    /// The discriminator is bound to a different Rust type.
    #[error("event type {event_type} is registered as {registered}, not {actual}")]
    TypeMismatch {
        /// The discriminator.
        event_type: String,
        /// The registered Rust type.
        registered: &'static str,
        /// The Rust type that was offered.
        actual: &'static str,
    },

    /// The payload has no string `eventType` field.
    #[error("payload has no eventType discriminator")]
    MissingDiscriminator,

    /// No type is registered for the discriminator.
    #[error("no type registered for event type {0}")]
    UnknownEventType(String),

    /// The payload is not valid JSON for the target type.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

type DecodeFn = fn(Value) -> Result<Box<dyn DomainEvent>, serde_json::Error>;

fn decode_into<E: IntegrationEvent>(value: Value) -> Result<Box<dyn DomainEvent>, serde_json::Error> {
    let event: E = serde_json::from_value(value)?;
    Ok(Box::new(event))
}

#[derive(Clone, Copy)]
struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn,
}

impl Registration {
    fn of<E: IntegrationEvent>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
            decode: decode_into::<E>,
        }
    }
}

/// Thread-safe map from discriminator to concrete event type.
#[derive(Default)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `E::EVENT_TYPE` to `E`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::EmptyEventType` for an empty discriminator and
    /// `CodecError::AlreadyRegistered` if the discriminator is bound and
    /// `force` is `false`.
    pub fn register<E: IntegrationEvent>(&self, force: bool) -> Result<(), CodecError> {
        self.register_as::<E>(E::EVENT_TYPE, force)
    }

    fn register_as<E: IntegrationEvent>(
        &self,
        event_type: &str,
        force: bool,
    ) -> Result<(), CodecError> {
        if event_type.trim().is_empty() {
            return Err(CodecError::EmptyEventType);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(event_type.to_owned()) {
            Entry::Occupied(_) if !force => Err(CodecError::AlreadyRegistered {
                event_type: event_type.to_owned(),
            }),
            Entry::Occupied(mut slot) => {
                slot.insert(Registration::of::<E>());
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(Registration::of::<E>());
                debug!(event_type, rust_type = type_name::<E>(), "registered event type");
                Ok(())
            }
        }
    }

    /// Removes the binding for `E::EVENT_TYPE`. Returns whether one existed.
    pub fn unregister<E: IntegrationEvent>(&self) -> bool {
        self.unregister_type(E::EVENT_TYPE)
    }

    /// Removes the binding for a discriminator. Returns whether one existed.
    pub fn unregister_type(&self, event_type: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event_type)
            .is_some()
    }

    /// Returns whether the discriminator is bound.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event_type)
    }

    /// Returns every bound discriminator, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    fn lookup(&self, event_type: &str) -> Option<Registration> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .copied()
    }
}

/// Converts between concrete events and their JSON wire form.
#[derive(Debug, Default)]
pub struct EventCodec {
    registry: TypeRegistry,
}

impl EventCodec {
    /// Creates a codec with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec and runs a static registration list against it.
    ///
    /// # Errors
    ///
    /// Propagates the first registration failure.
    pub fn with_events<F>(register: F) -> Result<Self, CodecError>
    where
        F: FnOnce(&TypeRegistry) -> Result<(), CodecError>,
    {
        let codec = Self::new();
        register(&codec.registry)?;
        Ok(codec)
    }

    /// Returns the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Serializes an event to its wire form.
    ///
    /// If the event's discriminator is not yet registered, `E` is registered
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::EmptyEventType` for an empty discriminator,
    /// `CodecError::TypeMismatch` if the discriminator is bound to another
    /// type, or `CodecError::Json` if serialization fails.
    pub fn serialize<E: IntegrationEvent>(&self, event: &E) -> Result<String, CodecError> {
        let event_type = event.metadata().event_type.as_str();
        if event_type.trim().is_empty() {
            return Err(CodecError::EmptyEventType);
        }
        match self.registry.lookup(event_type) {
            Some(registration) if registration.type_id != TypeId::of::<E>() => {
                return Err(CodecError::TypeMismatch {
                    event_type: event_type.to_owned(),
                    registered: registration.type_name,
                    actual: type_name::<E>(),
                });
            }
            Some(_) => {}
            None => match self.registry.register_as::<E>(event_type, false) {
                // Lost a registration race to another writer; the next
                // lookup settles which type won.
                Ok(()) | Err(CodecError::AlreadyRegistered { .. }) => {}
                Err(e) => return Err(e),
            },
        }
        Ok(serde_json::to_string(event)?)
    }

    /// Decodes a payload, reading its own discriminator.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::MissingDiscriminator`,
    /// `CodecError::UnknownEventType` or `CodecError::Json`.
    pub fn try_deserialize(&self, payload: &str) -> Result<Box<dyn DomainEvent>, CodecError> {
        let value: Value = serde_json::from_str(payload)?;
        let event_type = value
            .get(EVENT_TYPE_FIELD)
            .and_then(Value::as_str)
            .filter(|event_type| !event_type.is_empty())
            .ok_or(CodecError::MissingDiscriminator)?
            .to_owned();
        self.decode_value(&event_type, value)
    }

    /// Decodes a payload, returning `None` for anything unprocessable.
    #[must_use]
    pub fn deserialize(&self, payload: &str) -> Option<Box<dyn DomainEvent>> {
        match self.try_deserialize(payload) {
            Ok(event) => Some(event),
            Err(error) => {
                warn!(%error, "could not decode event payload");
                None
            }
        }
    }

    /// Decodes a payload into the type registered for `event_type`, ignoring
    /// the payload's own discriminator.
    #[must_use]
    pub fn deserialize_as(&self, event_type: &str, payload: &str) -> Option<Box<dyn DomainEvent>> {
        let decoded = serde_json::from_str::<Value>(payload)
            .map_err(CodecError::from)
            .and_then(|value| self.decode_value(event_type, value));
        match decoded {
            Ok(event) => Some(event),
            Err(error) => {
                warn!(event_type, %error, "could not decode stored event");
                None
            }
        }
    }

    fn decode_value(&self, event_type: &str, value: Value) -> Result<Box<dyn DomainEvent>, CodecError> {
        let registration = self
            .registry
            .lookup(event_type)
            .ok_or_else(|| CodecError::UnknownEventType(event_type.to_owned()))?;
        Ok((registration.decode)(value)?)
    }
}
