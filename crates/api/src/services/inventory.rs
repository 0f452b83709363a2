//! Inventory ledger.
//!
//! Stock counters are only ever changed through [`reserve_in`] and
//! [`release_in`]. Both run inside a caller-supplied transaction so checkout
//! and order transitions can combine them with other writes; the
//! [`InventoryLedger`] wraps them in a transaction of their own.

use thiserror::Error;
use tracing::{debug, instrument};

use cartwright_core::StockKey;

use crate::db::{RepositoryError, StockChange, Store, Transaction};

/// Errors from stock reservation and release.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("insufficient stock for {key}: available {available}, requested {requested}")]
    InsufficientStock {
        key: StockKey,
        available: i32,
        requested: i32,
    },

    #[error("no stock counter for {0}")]
    NotFound(StockKey),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

const fn check_quantity(quantity: i32) -> Result<(), LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// Take `quantity` units of `key` inside `tx`. Returns the remaining level.
///
/// # Errors
///
/// Returns `InsufficientStock` without changing anything when fewer than
/// `quantity` units are available, `NotFound` when the key has no counter.
pub async fn reserve_in(
    tx: &mut dyn Transaction,
    key: StockKey,
    quantity: i32,
) -> Result<i32, LedgerError> {
    check_quantity(quantity)?;

    match tx.take_stock(key, quantity).await? {
        StockChange::Applied { remaining } => {
            if key.is_variant() {
                tx.sync_product_stock(key.product_id).await?;
            }
            debug!(%key, quantity, remaining, "Stock reserved");
            Ok(remaining)
        }
        StockChange::Insufficient { available } => Err(LedgerError::InsufficientStock {
            key,
            available,
            requested: quantity,
        }),
        StockChange::Missing => Err(LedgerError::NotFound(key)),
    }
}

/// Return `quantity` units of `key` inside `tx`. Returns the new level.
///
/// # Errors
///
/// Returns `NotFound` when the key has no counter.
pub async fn release_in(
    tx: &mut dyn Transaction,
    key: StockKey,
    quantity: i32,
) -> Result<i32, LedgerError> {
    check_quantity(quantity)?;

    let level = tx
        .return_stock(key, quantity)
        .await?
        .ok_or(LedgerError::NotFound(key))?;
    if key.is_variant() {
        tx.sync_product_stock(key.product_id).await?;
    }
    debug!(%key, quantity, level, "Stock released");
    Ok(level)
}

/// Standalone reserve and release, each in its own transaction.
pub struct InventoryLedger<'a> {
    store: &'a dyn Store,
}

impl<'a> InventoryLedger<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Reserve stock.
    ///
    /// # Errors
    ///
    /// See [`reserve_in`]; store failures roll the reservation back.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn reserve(&self, key: StockKey, quantity: i32) -> Result<i32, LedgerError> {
        let mut tx = self.store.begin().await?;
        let remaining = reserve_in(tx.as_mut(), key, quantity).await?;
        tx.commit().await?;
        Ok(remaining)
    }

    /// Release stock.
    ///
    /// # Errors
    ///
    /// See [`release_in`].
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn release(&self, key: StockKey, quantity: i32) -> Result<i32, LedgerError> {
        let mut tx = self.store.begin().await?;
        let level = release_in(tx.as_mut(), key, quantity).await?;
        tx.commit().await?;
        Ok(level)
    }

    /// Current level of a counter, `None` if the key has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn available(&self, key: StockKey) -> Result<Option<i32>, LedgerError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.stock_level(key).await?)
    }
}
