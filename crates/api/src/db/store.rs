//! Store and transaction traits.
//!
//! Every mutation happens inside a [`Transaction`]. A transaction that is
//! dropped without [`Transaction::commit`] is rolled back, so `?` anywhere in
//! a unit of work discards all of its writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cartwright_core::{
    AddressId, CallerId, CartId, CartItemId, OrderId, OrderNumber, OrderStatus, OutboxId,
    ProductId, ShippingAddress, StockKey,
};

use super::RepositoryError;
use crate::models::{
    CartItemRef, CartLine, NewOrder, Order, OrderFilter, OrderLine, OutboxKind, OutboxMessage,
};

/// Handle to a backend able to open transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// A unit of work spanning every store concern.
#[async_trait]
pub trait Transaction: StockOps + CartOps + AddressOps + OrderOps + OutboxOps + Send {
    /// Make every write in this unit of work durable.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Result of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Stock was decremented; `remaining` is the new level.
    Applied { remaining: i32 },
    /// Not enough stock; nothing changed.
    Insufficient { available: i32 },
    /// No stock counter exists for the key.
    Missing,
}

/// Stock counters.
///
/// A product-level key for a product that has size variants has no counter
/// of its own and is reported as missing.
#[async_trait]
pub trait StockOps {
    /// Lock the counter for `key` until the transaction ends and return its level.
    async fn lock_stock(&mut self, key: StockKey) -> Result<Option<i32>, RepositoryError>;

    /// Current level of the counter for `key`, without locking.
    async fn stock_level(&mut self, key: StockKey) -> Result<Option<i32>, RepositoryError>;

    /// Decrement by `quantity` only if at least that much is available.
    async fn take_stock(
        &mut self,
        key: StockKey,
        quantity: i32,
    ) -> Result<StockChange, RepositoryError>;

    /// Increment by `quantity`, returning the new level.
    async fn return_stock(
        &mut self,
        key: StockKey,
        quantity: i32,
    ) -> Result<Option<i32>, RepositoryError>;

    /// Recompute a product's aggregate stock as the sum of its variants.
    async fn sync_product_stock(&mut self, product_id: ProductId) -> Result<(), RepositoryError>;
}

/// Carts and their items.
#[async_trait]
pub trait CartOps {
    /// Find the caller's cart, optionally locking it.
    async fn find_cart(
        &mut self,
        caller: CallerId,
        lock: bool,
    ) -> Result<Option<CartId>, RepositoryError>;

    /// Create the caller's cart, or return the existing one.
    async fn create_cart(&mut self, caller: CallerId) -> Result<CartId, RepositoryError>;

    /// Lines of a cart joined with current catalog data, ordered by stock key.
    async fn cart_lines(&mut self, cart: CartId) -> Result<Vec<CartLine>, RepositoryError>;

    /// The line for `key` in `cart`, if present.
    async fn find_cart_item(
        &mut self,
        cart: CartId,
        key: StockKey,
    ) -> Result<Option<CartItemRef>, RepositoryError>;

    /// A cart item, but only if it belongs to the caller's cart.
    async fn owned_cart_item(
        &mut self,
        caller: CallerId,
        item: CartItemId,
    ) -> Result<Option<CartItemRef>, RepositoryError>;

    async fn insert_cart_item(
        &mut self,
        cart: CartId,
        key: StockKey,
        quantity: i32,
    ) -> Result<CartItemId, RepositoryError>;

    async fn set_cart_item_quantity(
        &mut self,
        item: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;

    async fn delete_cart_item(&mut self, item: CartItemId) -> Result<(), RepositoryError>;

    /// Remove every line from a cart, keeping the cart itself.
    async fn clear_cart(&mut self, cart: CartId) -> Result<(), RepositoryError>;
}

/// Saved shipping addresses.
#[async_trait]
pub trait AddressOps {
    /// A saved address, but only if it belongs to the caller.
    async fn owned_address(
        &mut self,
        caller: CallerId,
        address: AddressId,
    ) -> Result<Option<ShippingAddress>, RepositoryError>;

    /// Unset the caller's default address, if any.
    async fn clear_default_address(&mut self, caller: CallerId) -> Result<(), RepositoryError>;

    async fn insert_address(
        &mut self,
        caller: CallerId,
        address: &ShippingAddress,
        is_default: bool,
    ) -> Result<AddressId, RepositoryError>;
}

/// Orders and their lines.
#[async_trait]
pub trait OrderOps {
    /// Insert an order in `pending` together with its lines.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Find an order by number, optionally locking it.
    async fn order_by_number(
        &mut self,
        number: &OrderNumber,
        lock: bool,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Find an order by id, optionally locking it.
    async fn order_by_id(
        &mut self,
        order: OrderId,
        lock: bool,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<OrderLine>, RepositoryError>;

    async fn set_order_status(
        &mut self,
        order: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;

    /// Record the provider transaction. An order's transaction id is written
    /// once; a second write is a `Conflict`.
    async fn set_transaction_id(
        &mut self,
        order: OrderId,
        transaction_id: &str,
    ) -> Result<(), RepositoryError>;

    /// The caller's orders, newest first.
    async fn orders_for_caller(&mut self, caller: CallerId)
    -> Result<Vec<Order>, RepositoryError>;

    /// One page of orders matching `filter`, newest first, plus the total match count.
    async fn list_orders(
        &mut self,
        filter: &OrderFilter,
    ) -> Result<(Vec<Order>, i64), RepositoryError>;
}

/// The payment outbox.
#[async_trait]
pub trait OutboxOps {
    async fn enqueue_outbox(
        &mut self,
        order: OrderId,
        kind: OutboxKind,
        payload: serde_json::Value,
    ) -> Result<OutboxId, RepositoryError>;

    /// Undispatched messages below the attempt ceiling, oldest first.
    async fn pending_outbox(&mut self, limit: i64) -> Result<Vec<OutboxMessage>, RepositoryError>;

    /// A message, locked for the rest of the transaction.
    async fn outbox_message(
        &mut self,
        id: OutboxId,
    ) -> Result<Option<OutboxMessage>, RepositoryError>;

    /// Take the lease on a message until `until`.
    ///
    /// Returns `None` when the message is missing, dispatched, superseded or
    /// leased to someone else.
    async fn claim_outbox(
        &mut self,
        id: OutboxId,
        until: DateTime<Utc>,
    ) -> Result<Option<OutboxMessage>, RepositoryError>;

    /// Mark the order's undispatched messages of `kind` as superseded.
    /// Returns how many were marked.
    async fn supersede_outbox(
        &mut self,
        order: OrderId,
        kind: OutboxKind,
    ) -> Result<u64, RepositoryError>;

    /// Mark a message sent and drop its lease.
    async fn mark_outbox_dispatched(&mut self, id: OutboxId) -> Result<(), RepositoryError>;

    /// Count a failed attempt and drop the lease so the next run retries.
    async fn record_outbox_failure(
        &mut self,
        id: OutboxId,
        error: &str,
    ) -> Result<(), RepositoryError>;
}
