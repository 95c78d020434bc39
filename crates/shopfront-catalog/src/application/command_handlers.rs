//! Command handlers for the Catalog context.
//!
//! Each handler validates its command, builds the integration event and
//! writes it to the outbox in one transaction. Relational persistence of
//! the catalog itself would join the same transaction.

use shopfront_core::clock::Clock;
use shopfront_core::error::DomainError;
use shopfront_core::event::{EventMetadata, IntegrationEvent};
use shopfront_core::repository::{OutboxRow, OutboxStore};
use shopfront_messaging::EventCodec;
use tracing::info;
use uuid::Uuid;

use crate::domain::commands::{ChangeProductPrice, CreateCategory, CreateProduct, DeleteProduct};
use crate::domain::events::{CategoryCreated, ProductCreated, ProductDeleted, ProductPriceChanged};

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct CatalogCommandResult {
    /// The category or product affected by the command.
    pub aggregate_id: Uuid,
    /// The outbox row written for the emitted event.
    pub outbox_row: OutboxRow,
}

fn require_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::Validation("name must not be blank".into()));
    }
    Ok(())
}

fn require_price(price_cents: i64) -> Result<(), DomainError> {
    if price_cents < 0 {
        return Err(DomainError::Validation(format!(
            "price must not be negative, got {price_cents}"
        )));
    }
    Ok(())
}

fn metadata<E: IntegrationEvent>(correlation_id: Uuid, clock: &dyn Clock) -> EventMetadata {
    EventMetadata::for_event::<E>(clock.now(), Some(correlation_id.to_string()))
}

/// Serializes `event` and inserts it into the outbox in its own transaction.
async fn append_to_outbox<E: IntegrationEvent>(
    event: &E,
    codec: &EventCodec,
    outbox: &dyn OutboxStore,
) -> Result<OutboxRow, DomainError> {
    let meta = event.metadata();
    let payload = codec
        .serialize(event)
        .map_err(|e| DomainError::Infrastructure(format!("event serialization failed: {e}")))?;
    let row = OutboxRow::new(meta.message_id, E::EVENT_TYPE, payload, meta.occurred_at_utc);

    let mut tx = outbox.begin().await?;
    tx.insert(&row).await?;
    tx.commit().await?;

    info!(
        message_id = %row.id,
        event_type = %row.event_type,
        "Event written to outbox"
    );
    Ok(row)
}

/// Handles the `CreateCategory` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the name is blank, or the store's
/// error if the outbox write fails.
pub async fn handle_create_category(
    command: &CreateCategory,
    clock: &dyn Clock,
    codec: &EventCodec,
    outbox: &dyn OutboxStore,
) -> Result<CatalogCommandResult, DomainError> {
    require_name(&command.name)?;

    let event = CategoryCreated {
        metadata: metadata::<CategoryCreated>(command.correlation_id, clock),
        category_id: command.category_id,
        name: command.name.trim().to_owned(),
    };
    let outbox_row = append_to_outbox(&event, codec, outbox).await?;

    Ok(CatalogCommandResult {
        aggregate_id: command.category_id,
        outbox_row,
    })
}

/// Handles the `CreateProduct` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the name is blank or the price is
/// negative, or the store's error if the outbox write fails.
pub async fn handle_create_product(
    command: &CreateProduct,
    clock: &dyn Clock,
    codec: &EventCodec,
    outbox: &dyn OutboxStore,
) -> Result<CatalogCommandResult, DomainError> {
    require_name(&command.name)?;
    require_price(command.price_cents)?;

    let event = ProductCreated {
        metadata: metadata::<ProductCreated>(command.correlation_id, clock),
        product_id: command.product_id,
        category_id: command.category_id,
        name: command.name.trim().to_owned(),
        price_cents: command.price_cents,
    };
    let outbox_row = append_to_outbox(&event, codec, outbox).await?;

    Ok(CatalogCommandResult {
        aggregate_id: command.product_id,
        outbox_row,
    })
}

/// Handles the `ChangeProductPrice` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the price is negative, or the
/// store's error if the outbox write fails.
pub async fn handle_change_product_price(
    command: &ChangeProductPrice,
    clock: &dyn Clock,
    codec: &EventCodec,
    outbox: &dyn OutboxStore,
) -> Result<CatalogCommandResult, DomainError> {
    require_price(command.price_cents)?;

    let event = ProductPriceChanged {
        metadata: metadata::<ProductPriceChanged>(command.correlation_id, clock),
        product_id: command.product_id,
        price_cents: command.price_cents,
    };
    let outbox_row = append_to_outbox(&event, codec, outbox).await?;

    Ok(CatalogCommandResult {
        aggregate_id: command.product_id,
        outbox_row,
    })
}

/// Handles the `DeleteProduct` command.
///
/// # Errors
///
/// Returns the store's error if the outbox write fails.
pub async fn handle_delete_product(
    command: &DeleteProduct,
    clock: &dyn Clock,
    codec: &EventCodec,
    outbox: &dyn OutboxStore,
) -> Result<CatalogCommandResult, DomainError> {
    let event = ProductDeleted {
        metadata: metadata::<ProductDeleted>(command.correlation_id, clock),
        product_id: command.product_id,
    };
    let outbox_row = append_to_outbox(&event, codec, outbox).await?;

    Ok(CatalogCommandResult {
        aggregate_id: command.product_id,
        outbox_row,
    })
}
