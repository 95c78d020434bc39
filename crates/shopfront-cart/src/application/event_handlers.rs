//! Handlers that project catalog events into the cart's price book.

use std::sync::Arc;

use async_trait::async_trait;
use shopfront_catalog::domain::events::{ProductCreated, ProductDeleted, ProductPriceChanged};
use shopfront_core::error::DomainError;
use shopfront_messaging::{EventHandler, MessagingError, ShutdownSignal, SubscriberClient};
use tracing::{debug, info};

use crate::domain::price_book::CartPriceBook;

/// Records the launch price of a new product.
#[derive(Debug, Clone)]
pub struct ProductCreatedHandler {
    book: Arc<CartPriceBook>,
}

impl ProductCreatedHandler {
    /// Creates a handler writing to `book`.
    #[must_use]
    pub fn new(book: Arc<CartPriceBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl EventHandler<ProductCreated> for ProductCreatedHandler {
    async fn handle(
        &self,
        event: &ProductCreated,
        _shutdown: &ShutdownSignal,
    ) -> Result<(), DomainError> {
        self.book.set_price(
            event.product_id,
            event.price_cents,
            event.metadata.occurred_at_utc,
        );
        info!(product_id = %event.product_id, price_cents = event.price_cents, "Product priced");
        Ok(())
    }
}

/// Applies a price change.
#[derive(Debug, Clone)]
pub struct ProductPriceChangedHandler {
    book: Arc<CartPriceBook>,
}

impl ProductPriceChangedHandler {
    /// Creates a handler writing to `book`.
    #[must_use]
    pub fn new(book: Arc<CartPriceBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl EventHandler<ProductPriceChanged> for ProductPriceChangedHandler {
    async fn handle(
        &self,
        event: &ProductPriceChanged,
        _shutdown: &ShutdownSignal,
    ) -> Result<(), DomainError> {
        let applied = self.book.set_price(
            event.product_id,
            event.price_cents,
            event.metadata.occurred_at_utc,
        );
        if applied {
            info!(product_id = %event.product_id, price_cents = event.price_cents, "Price updated");
        } else {
            debug!(
                product_id = %event.product_id,
                message_id = %event.metadata.message_id,
                "Ignored stale price change"
            );
        }
        Ok(())
    }
}

/// Drops a deleted product from the price book.
#[derive(Debug, Clone)]
pub struct ProductDeletedHandler {
    book: Arc<CartPriceBook>,
}

impl ProductDeletedHandler {
    /// Creates a handler writing to `book`.
    #[must_use]
    pub fn new(book: Arc<CartPriceBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl EventHandler<ProductDeleted> for ProductDeletedHandler {
    async fn handle(
        &self,
        event: &ProductDeleted,
        _shutdown: &ShutdownSignal,
    ) -> Result<(), DomainError> {
        if self
            .book
            .remove(event.product_id, event.metadata.occurred_at_utc)
        {
            info!(product_id = %event.product_id, "Product removed from price book");
        }
        Ok(())
    }
}

/// Binds the cart's catalog handlers on `subscriber`.
///
/// # Errors
///
/// Returns `MessagingError::DuplicateHandler` if any of the catalog product
/// events already has a handler.
pub fn register_cart_handlers(
    subscriber: &SubscriberClient,
    book: Arc<CartPriceBook>,
) -> Result<(), MessagingError> {
    subscriber.register_handler::<ProductCreated, _>(ProductCreatedHandler::new(Arc::clone(&book)))?;
    subscriber.register_handler::<ProductPriceChanged, _>(ProductPriceChangedHandler::new(
        Arc::clone(&book),
    ))?;
    subscriber.register_handler::<ProductDeleted, _>(ProductDeletedHandler::new(book))?;
    info!(
        topic = subscriber.topic(),
        subscription = subscriber.subscription(),
        "Cart handlers registered"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use shopfront_core::event::EventMetadata;
    use uuid::Uuid;

    use super::*;

    fn metadata<E: shopfront_core::event::IntegrationEvent>(minute: i64) -> EventMetadata {
        EventMetadata::for_event::<E>(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap() + Duration::minutes(minute),
            None,
        )
    }

    fn created(product_id: Uuid, price_cents: i64) -> ProductCreated {
        ProductCreated {
            metadata: metadata::<ProductCreated>(0),
            product_id,
            category_id: Uuid::new_v4(),
            name: "Filter Papers".into(),
            price_cents,
        }
    }

    #[tokio::test]
    async fn test_created_then_changed_then_deleted() {
        let book = Arc::new(CartPriceBook::new());
        let product_id = Uuid::new_v4();
        let shutdown = ShutdownSignal::never();

        ProductCreatedHandler::new(Arc::clone(&book))
            .handle(&created(product_id, 300), &shutdown)
            .await
            .unwrap();
        assert_eq!(book.price(product_id), Some(300));

        ProductPriceChangedHandler::new(Arc::clone(&book))
            .handle(
                &ProductPriceChanged {
                    metadata: metadata::<ProductPriceChanged>(1),
                    product_id,
                    price_cents: 350,
                },
                &shutdown,
            )
            .await
            .unwrap();
        assert_eq!(book.price(product_id), Some(350));

        ProductDeletedHandler::new(Arc::clone(&book))
            .handle(
                &ProductDeleted {
                    metadata: metadata::<ProductDeleted>(2),
                    product_id,
                },
                &shutdown,
            )
            .await
            .unwrap();
        assert_eq!(book.price(product_id), None);
    }

    #[tokio::test]
    async fn test_redelivered_creation_does_not_undo_later_price_change() {
        let book = Arc::new(CartPriceBook::new());
        let product_id = Uuid::new_v4();
        let shutdown = ShutdownSignal::never();
        let creation = created(product_id, 300);
        let created_handler = ProductCreatedHandler::new(Arc::clone(&book));
        created_handler.handle(&creation, &shutdown).await.unwrap();
        ProductPriceChangedHandler::new(Arc::clone(&book))
            .handle(
                &ProductPriceChanged {
                    metadata: metadata::<ProductPriceChanged>(10),
                    product_id,
                    price_cents: 250,
                },
                &shutdown,
            )
            .await
            .unwrap();

        created_handler.handle(&creation, &shutdown).await.unwrap();

        assert_eq!(book.price(product_id), Some(250));
    }

    #[tokio::test]
    async fn test_deleting_unknown_product_succeeds() {
        let book = Arc::new(CartPriceBook::new());

        let result = ProductDeletedHandler::new(Arc::clone(&book))
            .handle(
                &ProductDeleted {
                    metadata: metadata::<ProductDeleted>(0),
                    product_id: Uuid::new_v4(),
                },
                &ShutdownSignal::never(),
            )
            .await;

        assert!(result.is_ok());
        assert!(book.is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_creation_after_deletion_keeps_product_deleted() {
        let book = Arc::new(CartPriceBook::new());
        let product_id = Uuid::new_v4();
        let shutdown = ShutdownSignal::never();
        let creation = created(product_id, 300);
        let created_handler = ProductCreatedHandler::new(Arc::clone(&book));
        created_handler.handle(&creation, &shutdown).await.unwrap();
        ProductDeletedHandler::new(Arc::clone(&book))
            .handle(
                &ProductDeleted {
                    metadata: metadata::<ProductDeleted>(5),
                    product_id,
                },
                &shutdown,
            )
            .await
            .unwrap();

        created_handler.handle(&creation, &shutdown).await.unwrap();
        ProductPriceChangedHandler::new(Arc::clone(&book))
            .handle(
                &ProductPriceChanged {
                    metadata: metadata::<ProductPriceChanged>(3),
                    product_id,
                    price_cents: 275,
                },
                &shutdown,
            )
            .await
            .unwrap();

        assert_eq!(book.price(product_id), None);
        assert!(book.is_empty());
    }
}
