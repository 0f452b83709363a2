//! Cart store.
//!
//! One cart per caller, created on first access. Every mutation locks the
//! caller's cart row first, so concurrent requests from one caller apply one
//! after another. Stock checks here are advisory; the ledger has the final
//! say at checkout.

use thiserror::Error;
use tracing::{debug, instrument};

use cartwright_core::{CallerId, CartId, CartItemId, StockKey};

use crate::db::{RepositoryError, Store, Transaction};
use crate::models::{CartSummary, QuantityMode};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("{0}")]
    Validation(String),

    #[error("product not found: {0}")]
    ProductNotFound(StockKey),

    #[error("not enough stock available: requested {requested}, available {available}")]
    QuantityExceedsStock { available: i32, requested: i32 },

    #[error("cart item not found")]
    NotFound,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Lock the caller's cart, creating it if needed.
pub(crate) async fn lock_or_create_cart(
    tx: &mut dyn Transaction,
    caller: CallerId,
) -> Result<CartId, RepositoryError> {
    if let Some(cart) = tx.find_cart(caller, true).await? {
        return Ok(cart);
    }
    tx.create_cart(caller).await
}

async fn stock_ceiling(
    tx: &mut dyn Transaction,
    key: StockKey,
    requested: i32,
) -> Result<(), CartError> {
    let available = tx
        .stock_level(key)
        .await?
        .ok_or(CartError::ProductNotFound(key))?;
    if requested > available {
        return Err(CartError::QuantityExceedsStock {
            available,
            requested,
        });
    }
    Ok(())
}

/// Cart operations for a single store.
pub struct CartService<'a> {
    store: &'a dyn Store,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The caller's cart id, creating the cart if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_or_create(&self, caller: CallerId) -> Result<CartId, CartError> {
        let mut tx = self.store.begin().await?;
        let cart = match tx.find_cart(caller, false).await? {
            Some(cart) => cart,
            None => tx.create_cart(caller).await?,
        };
        tx.commit().await?;
        Ok(cart)
    }

    /// Lines with current prices and totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self, caller), fields(caller = %caller))]
    pub async fn summary(&self, caller: CallerId) -> Result<CartSummary, CartError> {
        let mut tx = self.store.begin().await?;
        let cart = match tx.find_cart(caller, false).await? {
            Some(cart) => cart,
            None => tx.create_cart(caller).await?,
        };
        let lines = tx.cart_lines(cart).await?;
        tx.commit().await?;
        Ok(CartSummary::new(cart, lines))
    }

    /// Add to or overwrite the line for `key`.
    ///
    /// With [`QuantityMode::Add`] the quantity is added to an existing line,
    /// with [`QuantityMode::Set`] it replaces it. The resulting quantity must
    /// not exceed current stock.
    ///
    /// # Errors
    ///
    /// `Validation` for a quantity below one, `ProductNotFound` when the key
    /// has no stock counter, `QuantityExceedsStock` when the line would
    /// exceed stock.
    #[instrument(skip(self, caller, key), fields(caller = %caller, key = %key))]
    pub async fn upsert_item(
        &self,
        caller: CallerId,
        key: StockKey,
        quantity: i32,
        mode: QuantityMode,
    ) -> Result<CartItemId, CartError> {
        if quantity < 1 {
            return Err(CartError::Validation(
                "quantity must be at least 1".to_owned(),
            ));
        }

        let mut tx = self.store.begin().await?;
        stock_ceiling(tx.as_mut(), key, quantity).await?;

        let cart = lock_or_create_cart(tx.as_mut(), caller).await?;
        let item = match tx.find_cart_item(cart, key).await? {
            Some(existing) => {
                let target = match mode {
                    QuantityMode::Add => existing.quantity.saturating_add(quantity),
                    QuantityMode::Set => quantity,
                };
                stock_ceiling(tx.as_mut(), key, target).await?;
                tx.set_cart_item_quantity(existing.id, target).await?;
                debug!(item = %existing.id, quantity = target, "Cart line updated");
                existing.id
            }
            None => {
                let id = tx.insert_cart_item(cart, key, quantity).await?;
                debug!(item = %id, quantity, "Cart line added");
                id
            }
        };

        tx.commit().await?;
        Ok(item)
    }

    /// Set the quantity of one of the caller's lines; zero removes it.
    ///
    /// # Errors
    ///
    /// `Validation` for a negative quantity, `NotFound` when the item is not
    /// in the caller's cart, `QuantityExceedsStock` when above stock.
    #[instrument(skip(self, caller, item), fields(caller = %caller, item = %item))]
    pub async fn set_item_quantity(
        &self,
        caller: CallerId,
        item: CartItemId,
        quantity: i32,
    ) -> Result<(), CartError> {
        if quantity < 0 {
            return Err(CartError::Validation(
                "quantity cannot be negative".to_owned(),
            ));
        }

        let mut tx = self.store.begin().await?;
        tx.find_cart(caller, true).await?.ok_or(CartError::NotFound)?;
        let line = tx
            .owned_cart_item(caller, item)
            .await?
            .ok_or(CartError::NotFound)?;

        if quantity == 0 {
            tx.delete_cart_item(line.id).await?;
            debug!("Cart line removed");
        } else {
            stock_ceiling(tx.as_mut(), line.key, quantity).await?;
            tx.set_cart_item_quantity(line.id, quantity).await?;
            debug!(quantity, "Cart line updated");
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove one of the caller's lines.
    ///
    /// # Errors
    ///
    /// `NotFound` when the item is not in the caller's cart.
    #[instrument(skip(self, caller, item), fields(caller = %caller, item = %item))]
    pub async fn remove_item(&self, caller: CallerId, item: CartItemId) -> Result<(), CartError> {
        let mut tx = self.store.begin().await?;
        tx.find_cart(caller, true).await?.ok_or(CartError::NotFound)?;
        let line = tx
            .owned_cart_item(caller, item)
            .await?
            .ok_or(CartError::NotFound)?;
        tx.delete_cart_item(line.id).await?;
        tx.commit().await?;
        debug!("Cart line removed");
        Ok(())
    }

    /// Empty the caller's cart. A caller without a cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self, caller), fields(caller = %caller))]
    pub async fn clear(&self, caller: CallerId) -> Result<(), CartError> {
        let mut tx = self.store.begin().await?;
        if let Some(cart) = tx.find_cart(caller, true).await? {
            tx.clear_cart(cart).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
