//! Store access for the order-fulfillment core.
//!
//! Services talk to a [`Store`] and the [`Transaction`]s it opens. Two
//! backends implement it:
//!
//! - [`PgStore`] - `PostgreSQL`, used by the binary
//! - [`MemoryStore`] - in-process, used by tests and local experiments
//!
//! # Database layout
//!
//! ## `catalog` (owned by the catalog service; only stock columns are written here)
//!
//! - `catalog.product` - name, price, aggregate stock
//! - `catalog.size` - size names
//! - `catalog.product_size` - per-variant stock
//!
//! ## `shop`
//!
//! - `shop.cart`, `shop.cart_item` - one cart per caller
//! - `shop.shipping_address` - saved addresses, at most one default per caller
//! - `shop.orders`, `shop.order_item` - orders and captured lines
//! - `shop.payment_outbox` - provider calls waiting to be dispatched
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p cartwright-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;
mod store;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{
    AddressOps, CartOps, OrderOps, OutboxOps, StockChange, StockOps, Store, Transaction,
};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order number).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to [`RepositoryError::Conflict`].
    pub(crate) fn unique_as_conflict(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
