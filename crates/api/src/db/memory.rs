//! In-memory store for tests and local experiments.
//!
//! A transaction takes the store's mutex for its whole lifetime and works on
//! a copy of the state; commit writes the copy back, drop discards it.
//! Transactions are therefore fully serialized, which gives the same
//! observable outcomes as row locks plus conditional updates in `PostgreSQL`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use cartwright_core::{
    AddressId, CallerId, CartId, CartItemId, Money, OrderId, OrderNumber, OrderStatus, OutboxId,
    ProductId, ShippingAddress, SizeId, StockKey,
};

use super::{
    AddressOps, CartOps, OrderOps, OutboxOps, RepositoryError, StockChange, StockOps, Store,
    Transaction,
};
use crate::models::{
    CartItemRef, CartLine, NewOrder, Order, OrderFilter, OrderLine, OutboxKind, OutboxMessage,
};

#[derive(Debug, Clone)]
struct ProductRecord {
    name: String,
    price: Money,
    stock: i32,
}

#[derive(Debug, Clone, Copy)]
struct CartItemRecord {
    cart_id: CartId,
    key: StockKey,
    quantity: i32,
}

#[derive(Debug, Clone)]
struct AddressRecord {
    caller_id: CallerId,
    address: ShippingAddress,
    is_default: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_id: i32,
    products: BTreeMap<ProductId, ProductRecord>,
    sizes: BTreeMap<SizeId, String>,
    variants: BTreeMap<(ProductId, SizeId), i32>,
    carts: BTreeMap<CallerId, CartId>,
    cart_items: BTreeMap<CartItemId, CartItemRecord>,
    addresses: BTreeMap<AddressId, AddressRecord>,
    orders: BTreeMap<OrderId, Order>,
    order_lines: BTreeMap<OrderId, Vec<OrderLine>>,
    outbox: BTreeMap<OutboxId, OutboxMessage>,
    failing_keys: BTreeSet<StockKey>,
}

impl MemoryState {
    const fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn has_variants(&self, product_id: ProductId) -> bool {
        self.variants.keys().any(|(product, _)| *product == product_id)
    }

    fn level(&self, key: StockKey) -> Option<i32> {
        match key.size_id {
            Some(size_id) => self.variants.get(&(key.product_id, size_id)).copied(),
            None if self.has_variants(key.product_id) => None,
            None => self.products.get(&key.product_id).map(|p| p.stock),
        }
    }

    fn level_mut(&mut self, key: StockKey) -> Option<&mut i32> {
        match key.size_id {
            Some(size_id) => self.variants.get_mut(&(key.product_id, size_id)),
            None if self.has_variants(key.product_id) => None,
            None => self.products.get_mut(&key.product_id).map(|p| &mut p.stock),
        }
    }

    fn check_writable(&self, key: StockKey) -> Result<(), RepositoryError> {
        if self.failing_keys.contains(&key) {
            return Err(RepositoryError::DataCorruption(format!(
                "stock write failed for {key}"
            )));
        }
        Ok(())
    }

    fn sync_product(&mut self, product_id: ProductId) {
        if !self.has_variants(product_id) {
            return;
        }
        let sum = self
            .variants
            .iter()
            .filter(|((product, _), _)| *product == product_id)
            .map(|(_, stock)| *stock)
            .sum();
        if let Some(product) = self.products.get_mut(&product_id) {
            product.stock = sum;
        }
    }

    fn item_ref(id: CartItemId, item: CartItemRecord) -> CartItemRef {
        CartItemRef {
            id,
            cart_id: item.cart_id,
            key: item.key,
            quantity: item.quantity,
        }
    }
}

/// Store keeping all state in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product without size variants.
    pub async fn add_product(&self, name: &str, price: Money, stock: i32) -> ProductId {
        let mut state = self.state.lock().await;
        let id = ProductId::new(state.next_id());
        state.products.insert(
            id,
            ProductRecord {
                name: name.to_owned(),
                price,
                stock,
            },
        );
        id
    }

    /// Add a product with one stock counter per size.
    ///
    /// Sizes are shared across products by name. Returns the size ids in the
    /// order given.
    pub async fn add_sized_product(
        &self,
        name: &str,
        price: Money,
        sizes: &[(&str, i32)],
    ) -> (ProductId, Vec<SizeId>) {
        let mut state = self.state.lock().await;
        let product_id = ProductId::new(state.next_id());
        state.products.insert(
            product_id,
            ProductRecord {
                name: name.to_owned(),
                price,
                stock: 0,
            },
        );

        let mut size_ids = Vec::with_capacity(sizes.len());
        for (size_name, stock) in sizes {
            let existing = state
                .sizes
                .iter()
                .find(|(_, n)| n.as_str() == *size_name)
                .map(|(id, _)| *id);
            let size_id = match existing {
                Some(id) => id,
                None => {
                    let id = SizeId::new(state.next_id());
                    state.sizes.insert(id, (*size_name).to_owned());
                    id
                }
            };
            state.variants.insert((product_id, size_id), *stock);
            size_ids.push(size_id);
        }
        state.sync_product(product_id);

        (product_id, size_ids)
    }

    /// Delete a product, its variants and any cart lines referencing it.
    pub async fn remove_product(&self, product_id: ProductId) {
        let mut state = self.state.lock().await;
        state.products.remove(&product_id);
        state.variants.retain(|(product, _), _| *product != product_id);
        state
            .cart_items
            .retain(|_, item| item.key.product_id != product_id);
    }

    /// Overwrite the level of a stock counter.
    pub async fn set_stock(&self, key: StockKey, stock: i32) {
        let mut state = self.state.lock().await;
        if let Some(level) = state.level_mut(key) {
            *level = stock;
        }
        state.sync_product(key.product_id);
    }

    /// Current level of a stock counter.
    pub async fn stock(&self, key: StockKey) -> Option<i32> {
        self.state.lock().await.level(key)
    }

    /// Aggregate stock column of a product, variants or not.
    pub async fn product_stock(&self, product_id: ProductId) -> Option<i32> {
        self.state
            .lock()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock)
    }

    /// Make every subsequent stock write to `key` fail.
    pub async fn fail_stock_writes(&self, key: StockKey) {
        self.state.lock().await.failing_keys.insert(key);
    }

    /// Every outbox message, oldest first.
    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.values().cloned().collect()
    }

    /// Saved addresses of a caller as `(address, is_default)`, oldest first.
    pub async fn addresses(&self, caller: CallerId) -> Vec<(ShippingAddress, bool)> {
        self.state
            .lock()
            .await
            .addresses
            .values()
            .filter(|record| record.caller_id == caller)
            .map(|record| (record.address.clone(), record.is_default))
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, work }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Unit of work over a private copy of the state.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl StockOps for MemoryTransaction {
    async fn lock_stock(&mut self, key: StockKey) -> Result<Option<i32>, RepositoryError> {
        Ok(self.work.level(key))
    }

    async fn stock_level(&mut self, key: StockKey) -> Result<Option<i32>, RepositoryError> {
        Ok(self.work.level(key))
    }

    async fn take_stock(
        &mut self,
        key: StockKey,
        quantity: i32,
    ) -> Result<StockChange, RepositoryError> {
        self.work.check_writable(key)?;
        let Some(level) = self.work.level_mut(key) else {
            return Ok(StockChange::Missing);
        };
        if *level < quantity {
            return Ok(StockChange::Insufficient { available: *level });
        }
        *level -= quantity;
        Ok(StockChange::Applied { remaining: *level })
    }

    async fn return_stock(
        &mut self,
        key: StockKey,
        quantity: i32,
    ) -> Result<Option<i32>, RepositoryError> {
        self.work.check_writable(key)?;
        Ok(self.work.level_mut(key).map(|level| {
            *level += quantity;
            *level
        }))
    }

    async fn sync_product_stock(&mut self, product_id: ProductId) -> Result<(), RepositoryError> {
        self.work.sync_product(product_id);
        Ok(())
    }
}

#[async_trait]
impl CartOps for MemoryTransaction {
    async fn find_cart(
        &mut self,
        caller: CallerId,
        _lock: bool,
    ) -> Result<Option<CartId>, RepositoryError> {
        Ok(self.work.carts.get(&caller).copied())
    }

    async fn create_cart(&mut self, caller: CallerId) -> Result<CartId, RepositoryError> {
        if let Some(id) = self.work.carts.get(&caller) {
            return Ok(*id);
        }
        let id = CartId::new(self.work.next_id());
        self.work.carts.insert(caller, id);
        Ok(id)
    }

    async fn cart_lines(&mut self, cart: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let state = &self.work;
        let mut lines: Vec<CartLine> = state
            .cart_items
            .iter()
            .filter(|(_, item)| item.cart_id == cart)
            .filter_map(|(id, item)| {
                let product = state.products.get(&item.key.product_id)?;
                Some(CartLine {
                    item_id: *id,
                    key: item.key,
                    quantity: item.quantity,
                    product_name: product.name.clone(),
                    size_name: item.key.size_id.and_then(|s| state.sizes.get(&s).cloned()),
                    unit_price: product.price,
                    available: state.level(item.key).unwrap_or(0),
                })
            })
            .collect();
        lines.sort_by_key(|line| line.key);
        Ok(lines)
    }

    async fn find_cart_item(
        &mut self,
        cart: CartId,
        key: StockKey,
    ) -> Result<Option<CartItemRef>, RepositoryError> {
        Ok(self
            .work
            .cart_items
            .iter()
            .find(|(_, item)| item.cart_id == cart && item.key == key)
            .map(|(id, item)| MemoryState::item_ref(*id, *item)))
    }

    async fn owned_cart_item(
        &mut self,
        caller: CallerId,
        item: CartItemId,
    ) -> Result<Option<CartItemRef>, RepositoryError> {
        let Some(cart) = self.work.carts.get(&caller) else {
            return Ok(None);
        };
        Ok(self
            .work
            .cart_items
            .get(&item)
            .filter(|record| record.cart_id == *cart)
            .map(|record| MemoryState::item_ref(item, *record)))
    }

    async fn insert_cart_item(
        &mut self,
        cart: CartId,
        key: StockKey,
        quantity: i32,
    ) -> Result<CartItemId, RepositoryError> {
        if self
            .work
            .cart_items
            .values()
            .any(|item| item.cart_id == cart && item.key == key)
        {
            return Err(RepositoryError::Conflict("cart line already exists".to_owned()));
        }
        let id = CartItemId::new(self.work.next_id());
        self.work.cart_items.insert(
            id,
            CartItemRecord {
                cart_id: cart,
                key,
                quantity,
            },
        );
        Ok(id)
    }

    async fn set_cart_item_quantity(
        &mut self,
        item: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let record = self
            .work
            .cart_items
            .get_mut(&item)
            .ok_or(RepositoryError::NotFound)?;
        record.quantity = quantity;
        Ok(())
    }

    async fn delete_cart_item(&mut self, item: CartItemId) -> Result<(), RepositoryError> {
        self.work
            .cart_items
            .remove(&item)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<(), RepositoryError> {
        self.work.cart_items.retain(|_, item| item.cart_id != cart);
        Ok(())
    }
}

#[async_trait]
impl AddressOps for MemoryTransaction {
    async fn owned_address(
        &mut self,
        caller: CallerId,
        address: AddressId,
    ) -> Result<Option<ShippingAddress>, RepositoryError> {
        Ok(self
            .work
            .addresses
            .get(&address)
            .filter(|record| record.caller_id == caller)
            .map(|record| record.address.clone()))
    }

    async fn clear_default_address(&mut self, caller: CallerId) -> Result<(), RepositoryError> {
        for record in self.work.addresses.values_mut() {
            if record.caller_id == caller {
                record.is_default = false;
            }
        }
        Ok(())
    }

    async fn insert_address(
        &mut self,
        caller: CallerId,
        address: &ShippingAddress,
        is_default: bool,
    ) -> Result<AddressId, RepositoryError> {
        if is_default
            && self
                .work
                .addresses
                .values()
                .any(|record| record.caller_id == caller && record.is_default)
        {
            return Err(RepositoryError::Conflict(
                "default address already exists".to_owned(),
            ));
        }
        let id = AddressId::new(self.work.next_id());
        self.work.addresses.insert(
            id,
            AddressRecord {
                caller_id: caller,
                address: address.clone(),
                is_default,
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl OrderOps for MemoryTransaction {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        if self
            .work
            .orders
            .values()
            .any(|existing| existing.number == order.number)
        {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_owned(),
            ));
        }
        let now = Utc::now();
        let id = OrderId::new(self.work.next_id());
        let record = Order {
            id,
            number: order.number.clone(),
            caller_id: order.caller_id,
            total: order.total(),
            status: OrderStatus::Pending,
            shipping_address: order.shipping_address.clone(),
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        self.work.orders.insert(id, record.clone());
        self.work.order_lines.insert(id, order.lines.clone());
        Ok(record)
    }

    async fn order_by_number(
        &mut self,
        number: &OrderNumber,
        _lock: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .work
            .orders
            .values()
            .find(|order| &order.number == number)
            .cloned())
    }

    async fn order_by_id(
        &mut self,
        order: OrderId,
        _lock: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.work.orders.get(&order).cloned())
    }

    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<OrderLine>, RepositoryError> {
        Ok(self
            .work
            .order_lines
            .get(&order)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_order_status(
        &mut self,
        order: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let record = self
            .work
            .orders
            .get_mut(&order)
            .ok_or(RepositoryError::NotFound)?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_transaction_id(
        &mut self,
        order: OrderId,
        transaction_id: &str,
    ) -> Result<(), RepositoryError> {
        let record = self
            .work
            .orders
            .get_mut(&order)
            .ok_or(RepositoryError::NotFound)?;
        if record.transaction_id.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "order {order} already has a transaction"
            )));
        }
        record.transaction_id = Some(transaction_id.to_owned());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn orders_for_caller(
        &mut self,
        caller: CallerId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .work
            .orders
            .values()
            .filter(|order| order.caller_id == caller)
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn list_orders(
        &mut self,
        filter: &OrderFilter,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let mut orders: Vec<Order> = self
            .work
            .orders
            .values()
            .filter(|order| filter.status.is_none_or(|status| order.status == status))
            .cloned()
            .collect();
        newest_first(&mut orders);

        let total = i64::try_from(orders.len())
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        let offset = usize::try_from(filter.offset()).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        let page = orders.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }
}

fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait]
impl OutboxOps for MemoryTransaction {
    async fn enqueue_outbox(
        &mut self,
        order: OrderId,
        kind: OutboxKind,
        payload: serde_json::Value,
    ) -> Result<OutboxId, RepositoryError> {
        let id = OutboxId::new(self.work.next_id());
        self.work.outbox.insert(
            id,
            OutboxMessage {
                id,
                order_id: order,
                kind,
                payload,
                attempts: 0,
                last_error: None,
                claimed_until: None,
                dispatched_at: None,
                superseded_at: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn pending_outbox(&mut self, limit: i64) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .work
            .outbox
            .values()
            .filter(|message| {
                !message.is_dispatched()
                    && !message.is_superseded()
                    && message.attempts < OutboxMessage::MAX_ATTEMPTS
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn outbox_message(
        &mut self,
        id: OutboxId,
    ) -> Result<Option<OutboxMessage>, RepositoryError> {
        Ok(self.work.outbox.get(&id).cloned())
    }

    async fn claim_outbox(
        &mut self,
        id: OutboxId,
        until: DateTime<Utc>,
    ) -> Result<Option<OutboxMessage>, RepositoryError> {
        let now = Utc::now();
        Ok(self
            .work
            .outbox
            .get_mut(&id)
            .filter(|message| message.is_claimable(now))
            .map(|message| {
                message.claimed_until = Some(until);
                message.clone()
            }))
    }

    async fn supersede_outbox(
        &mut self,
        order: OrderId,
        kind: OutboxKind,
    ) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut marked = 0;
        for message in self.work.outbox.values_mut().filter(|message| {
            message.order_id == order
                && message.kind == kind
                && !message.is_dispatched()
                && !message.is_superseded()
        }) {
            message.superseded_at = Some(now);
            marked += 1;
        }
        Ok(marked)
    }

    async fn mark_outbox_dispatched(&mut self, id: OutboxId) -> Result<(), RepositoryError> {
        let message = self
            .work
            .outbox
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        message.attempts += 1;
        message.last_error = None;
        message.claimed_until = None;
        message.dispatched_at = Some(Utc::now());
        Ok(())
    }

    async fn record_outbox_failure(
        &mut self,
        id: OutboxId,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let message = self
            .work
            .outbox
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        message.attempts += 1;
        message.last_error = Some(error.to_owned());
        message.claimed_until = None;
        Ok(())
    }
}
