//! `PostgreSQL` storage for the outbox and inbox tables.
//!
//! The schema lives in the workspace `migrations/` directory.

pub mod pg_inbox_store;
pub mod pg_outbox_store;

pub use pg_inbox_store::PgInboxStore;
pub use pg_outbox_store::PgOutboxStore;

use shopfront_core::error::DomainError;

fn infrastructure(error: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(error.to_string())
}
