//! Shopfront Cart: keeps the cart's view of catalog prices current by
//! consuming catalog events.

pub mod application {
    pub mod event_handlers;
}

pub mod domain {
    pub mod price_book;
}

pub use application::event_handlers::register_cart_handlers;
pub use domain::price_book::CartPriceBook;
