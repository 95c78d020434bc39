//! Commands for the Catalog context.

use uuid::Uuid;

/// Command to create a category.
#[derive(Debug, Clone)]
pub struct CreateCategory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The category identifier.
    pub category_id: Uuid,
    /// Display name. Must not be blank.
    pub name: String,
}

/// Command to create a product.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The product identifier.
    pub product_id: Uuid,
    /// The owning category.
    pub category_id: Uuid,
    /// Display name. Must not be blank.
    pub name: String,
    /// Unit price in cents. Must not be negative.
    pub price_cents: i64,
}

/// Command to change a product's price.
#[derive(Debug, Clone)]
pub struct ChangeProductPrice {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The product identifier.
    pub product_id: Uuid,
    /// The new unit price in cents. Must not be negative.
    pub price_cents: i64,
}

/// Command to delete a product.
#[derive(Debug, Clone)]
pub struct DeleteProduct {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The product identifier.
    pub product_id: Uuid,
}
