//! Read model of product prices as seen by the cart.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A known price, or a tombstone (`None`) left by a deletion.
#[derive(Debug, Clone, Copy)]
struct PriceEntry {
    price_cents: Option<i64>,
    as_of: DateTime<Utc>,
}

impl PriceEntry {
    /// Whether a write stamped `as_of` may replace this entry. Tombstones
    /// win ties.
    fn yields_to(&self, as_of: DateTime<Utc>) -> bool {
        match self.price_cents {
            Some(_) => self.as_of <= as_of,
            None => self.as_of < as_of,
        }
    }
}

/// Thread-safe map from product to its current unit price in cents.
///
/// Every write carries the time the catalog fact occurred. A write older
/// than the stored entry is ignored, so redelivered or reordered events
/// cannot roll a price back. Deleted products keep a tombstone, so an older
/// create or price change arriving late cannot bring them back.
#[derive(Debug, Default)]
pub struct CartPriceBook {
    prices: RwLock<HashMap<Uuid, PriceEntry>>,
}

impl CartPriceBook {
    /// Creates an empty price book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price of `product_id` unless a newer price is already known.
    /// Returns whether the write was applied.
    pub fn set_price(&self, product_id: Uuid, price_cents: i64, as_of: DateTime<Utc>) -> bool {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        if prices.get(&product_id).is_some_and(|existing| !existing.yields_to(as_of)) {
            return false;
        }
        prices.insert(
            product_id,
            PriceEntry {
                price_cents: Some(price_cents),
                as_of,
            },
        );
        true
    }

    /// Marks `product_id` deleted as of `as_of` unless a newer write is
    /// already known. Returns whether a live price was removed.
    pub fn remove(&self, product_id: Uuid, as_of: DateTime<Utc>) -> bool {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        let previous = prices.get(&product_id).copied();
        if previous.is_some_and(|existing| existing.as_of > as_of) {
            return false;
        }
        prices.insert(
            product_id,
            PriceEntry {
                price_cents: None,
                as_of,
            },
        );
        previous.is_some_and(|existing| existing.price_cents.is_some())
    }

    /// Returns the current price of `product_id`.
    #[must_use]
    pub fn price(&self, product_id: Uuid) -> Option<i64> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&product_id)
            .and_then(|entry| entry.price_cents)
    }

    /// Number of priced products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.price_cents.is_some())
            .count()
    }

    /// Returns `true` if no product is priced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn test_set_price_then_read() {
        let book = CartPriceBook::new();
        let product = Uuid::new_v4();

        assert!(book.set_price(product, 500, at(0)));

        assert_eq!(book.price(product), Some(500));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_older_write_is_ignored() {
        let book = CartPriceBook::new();
        let product = Uuid::new_v4();
        book.set_price(product, 700, at(5));

        let applied = book.set_price(product, 500, at(1));

        assert!(!applied);
        assert_eq!(book.price(product), Some(700));
    }

    #[test]
    fn test_same_instant_write_is_applied() {
        let book = CartPriceBook::new();
        let product = Uuid::new_v4();
        book.set_price(product, 700, at(5));

        assert!(book.set_price(product, 800, at(5)));
        assert_eq!(book.price(product), Some(800));
    }

    #[test]
    fn test_remove_missing_product_removes_nothing() {
        let book = CartPriceBook::new();

        assert!(!book.remove(Uuid::new_v4(), at(0)));
        assert!(book.is_empty());
    }

    #[test]
    fn test_older_writes_after_delete_do_not_resurrect_product() {
        let book = CartPriceBook::new();
        let product = Uuid::new_v4();
        book.set_price(product, 500, at(0));

        assert!(book.remove(product, at(10)));
        assert!(!book.set_price(product, 650, at(5)));
        assert!(!book.set_price(product, 500, at(0)));
        assert!(!book.set_price(product, 700, at(10)));

        assert_eq!(book.price(product), None);
        assert!(book.is_empty());
    }

    #[test]
    fn test_delete_before_create_is_remembered() {
        let book = CartPriceBook::new();
        let product = Uuid::new_v4();

        assert!(!book.remove(product, at(10)));
        assert!(!book.set_price(product, 500, at(0)));

        assert_eq!(book.price(product), None);
    }

    #[test]
    fn test_newer_price_after_delete_is_applied() {
        let book = CartPriceBook::new();
        let product = Uuid::new_v4();
        book.set_price(product, 500, at(0));
        book.remove(product, at(5));

        assert!(book.set_price(product, 900, at(6)));
        assert_eq!(book.price(product), Some(900));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_stale_delete_is_ignored() {
        let book = CartPriceBook::new();
        let product = Uuid::new_v4();
        book.set_price(product, 700, at(5));

        assert!(!book.remove(product, at(1)));
        assert_eq!(book.price(product), Some(700));
    }
}
