//! Integration events published by the Catalog context.
//!
//! Prices are integer minor units (cents) so they survive the JSON round
//! trip exactly.

use serde::{Deserialize, Serialize};
use shopfront_core::event::{EventMetadata, IntegrationEvent};
use uuid::Uuid;

/// Emitted when a category is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCreated {
    /// Envelope metadata.
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// The category identifier.
    pub category_id: Uuid,
    /// Display name.
    pub name: String,
}

impl IntegrationEvent for CategoryCreated {
    const EVENT_TYPE: &'static str = "catalog.category_created";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Emitted when a product is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreated {
    /// Envelope metadata.
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// The product identifier.
    pub product_id: Uuid,
    /// The owning category.
    pub category_id: Uuid,
    /// Display name.
    pub name: String,
    /// Unit price in cents.
    pub price_cents: i64,
}

impl IntegrationEvent for ProductCreated {
    const EVENT_TYPE: &'static str = "catalog.product_created";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Emitted when a product's price changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPriceChanged {
    /// Envelope metadata.
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// The product identifier.
    pub product_id: Uuid,
    /// The new unit price in cents.
    pub price_cents: i64,
}

impl IntegrationEvent for ProductPriceChanged {
    const EVENT_TYPE: &'static str = "catalog.product_price_changed";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Emitted when a product is removed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDeleted {
    /// Envelope metadata.
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// The product identifier.
    pub product_id: Uuid,
}

impl IntegrationEvent for ProductDeleted {
    const EVENT_TYPE: &'static str = "catalog.product_deleted";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
