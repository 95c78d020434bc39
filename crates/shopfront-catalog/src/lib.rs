//! Shopfront Catalog: categories, products and their integration events.
//!
//! Command handlers here never talk to the broker. Each one writes its event
//! to the outbox inside a single transaction and the relay publishes it
//! later.

pub mod application {
    pub mod command_handlers;
}

pub mod domain {
    pub mod commands;
    pub mod events;
}

use shopfront_messaging::{CodecError, TypeRegistry};

use crate::domain::events::{CategoryCreated, ProductCreated, ProductDeleted, ProductPriceChanged};

/// Registers every catalog event type with `registry`.
///
/// # Errors
///
/// Returns `CodecError::AlreadyRegistered` if one of the discriminators is
/// already bound.
pub fn register_events(registry: &TypeRegistry) -> Result<(), CodecError> {
    registry.register::<CategoryCreated>(false)?;
    registry.register::<ProductCreated>(false)?;
    registry.register::<ProductPriceChanged>(false)?;
    registry.register::<ProductDeleted>(false)
}

#[cfg(test)]
mod tests {
    use shopfront_messaging::EventCodec;

    use super::*;

    #[test]
    fn test_register_events_binds_every_catalog_event() {
        let codec = EventCodec::with_events(register_events).unwrap();

        let mut types = codec.registry().event_types();
        types.sort();

        assert_eq!(
            types,
            vec![
                "catalog.category_created",
                "catalog.product_created",
                "catalog.product_deleted",
                "catalog.product_price_changed",
            ]
        );
    }

    #[test]
    fn test_registering_twice_is_rejected() {
        let registry = TypeRegistry::new();
        register_events(&registry).unwrap();

        let result = register_events(&registry);

        assert!(matches!(result, Err(CodecError::AlreadyRegistered { .. })));
    }
}
