//! Checkout.
//!
//! Converts the caller's cart into a `pending` order in one transaction:
//! address resolution, stock verification under row locks, order insert,
//! stock decrement, cart clear and the payment outbox message all commit or
//! roll back together. The payment provider is called only after commit and
//! its failures never undo the order.

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use cartwright_core::{AddressId, CallerId, OrderNumber, ShippingAddress, StockKey};

use super::inventory::{LedgerError, reserve_in};
use super::payments::{DispatchOutcome, OutboxDispatcher, PaymentGateway, PaymentRequest};
use crate::db::{RepositoryError, Store, Transaction};
use crate::models::{Caller, CartLine, NewOrder, Order, OrderLine, OutboxKind};

/// Attempts at finding a free order number before giving up.
const ORDER_NUMBER_ATTEMPTS: i64 = 100;

/// Errors that abort a checkout. Nothing is written when one is returned.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid shipping address: {0}")]
    InvalidAddress(String),

    #[error("cart is empty")]
    EmptyCart,

    #[error(
        "insufficient stock for {product_name} ({key}): available {available}, requested {requested}"
    )]
    InsufficientStock {
        key: StockKey,
        product_name: String,
        available: i32,
        requested: i32,
    },

    #[error("{product_name} ({key}) is no longer available")]
    ProductUnavailable { key: StockKey, product_name: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Where the order ships to.
#[derive(Debug, Clone)]
pub enum ShippingInput {
    /// A saved address owned by the caller.
    Saved(AddressId),
    /// An address given with the checkout request.
    Inline {
        address: ShippingAddress,
        /// Make the saved copy the caller's default address.
        is_default: bool,
        /// Keep a saved copy.
        save: bool,
    },
}

/// State of the payment hand-off after the order was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentHandoff {
    Initiated { transaction_id: String },
    /// The provider call failed or is still queued; the order stays pending.
    Pending { reason: String },
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub items: Vec<OrderLine>,
    pub payment: PaymentHandoff,
}

/// Cart to order conversion.
pub struct CheckoutService<'a> {
    store: &'a dyn Store,
    gateway: &'a dyn PaymentGateway,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, gateway: &'a dyn PaymentGateway) -> Self {
        Self { store, gateway }
    }

    /// Place an order for everything in the caller's cart.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` when the address is incomplete or not the caller's,
    /// `EmptyCart`, `InsufficientStock` naming the first short line, or
    /// `ProductUnavailable` when a line's stock counter is gone.
    #[instrument(skip(self, caller, shipping), fields(caller = %caller.id))]
    pub async fn checkout(
        &self,
        caller: &Caller,
        shipping: ShippingInput,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        if let ShippingInput::Inline { address, .. } = &shipping {
            address
                .validate()
                .map_err(|e| CheckoutError::InvalidAddress(e.to_string()))?;
        }

        let mut tx = self.store.begin().await?;
        let shipping_address = resolve_address(tx.as_mut(), caller.id, shipping).await?;

        let cart = tx
            .find_cart(caller.id, true)
            .await?
            .ok_or(CheckoutError::EmptyCart)?;
        let mut lines = tx.cart_lines(cart).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        lines.sort_by_key(|line| line.key);
        verify_stock(tx.as_mut(), &lines).await?;

        let new_order = NewOrder {
            number: next_order_number(tx.as_mut(), caller.id).await?,
            caller_id: caller.id,
            shipping_address,
            lines: lines.iter().map(order_line).collect(),
        };
        let mut order = tx.insert_order(&new_order).await?;

        for line in &lines {
            reserve_in(tx.as_mut(), line.key, line.quantity)
                .await
                .map_err(|e| ledger_failure(e, line))?;
        }
        tx.clear_cart(cart).await?;

        let request = PaymentRequest::for_order(&order, &new_order.lines, caller.email.as_ref());
        let payload = serde_json::to_value(&request)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        let outbox = tx
            .enqueue_outbox(order.id, OutboxKind::CreatePayment, payload)
            .await?;
        tx.commit().await?;
        info!(order = %order.number, total = %order.total, lines = lines.len(), "Order placed");

        let payment = match OutboxDispatcher::new(self.store, self.gateway)
            .dispatch(outbox)
            .await
        {
            Ok(DispatchOutcome::PaymentCreated { transaction_id }) => {
                order.transaction_id = Some(transaction_id.clone());
                PaymentHandoff::Initiated { transaction_id }
            }
            Ok(DispatchOutcome::Failed { error }) => PaymentHandoff::Pending { reason: error },
            Ok(other) => {
                warn!(order = %order.number, outcome = ?other, "Unexpected payment dispatch outcome");
                PaymentHandoff::Pending {
                    reason: "payment request queued".to_owned(),
                }
            }
            Err(e) => {
                error!(order = %order.number, error = %e, "Failed to dispatch payment request");
                PaymentHandoff::Pending {
                    reason: "payment request queued".to_owned(),
                }
            }
        };

        Ok(CheckoutReceipt {
            order,
            items: new_order.lines,
            payment,
        })
    }
}

async fn resolve_address(
    tx: &mut dyn Transaction,
    caller: CallerId,
    shipping: ShippingInput,
) -> Result<ShippingAddress, CheckoutError> {
    match shipping {
        ShippingInput::Saved(id) => tx
            .owned_address(caller, id)
            .await?
            .ok_or_else(|| CheckoutError::InvalidAddress("shipping address not found".to_owned())),
        ShippingInput::Inline {
            address,
            is_default,
            save,
        } => {
            if save {
                if is_default {
                    tx.clear_default_address(caller).await?;
                }
                tx.insert_address(caller, &address, is_default).await?;
            }
            Ok(address)
        }
    }
}

/// Lock every line's stock counter in key order and check it covers the line.
async fn verify_stock(tx: &mut dyn Transaction, lines: &[CartLine]) -> Result<(), CheckoutError> {
    for line in lines {
        let available =
            tx.lock_stock(line.key)
                .await?
                .ok_or_else(|| CheckoutError::ProductUnavailable {
                    key: line.key,
                    product_name: line.product_name.clone(),
                })?;
        if available < line.quantity {
            return Err(CheckoutError::InsufficientStock {
                key: line.key,
                product_name: line.product_name.clone(),
                available,
                requested: line.quantity,
            });
        }
    }
    Ok(())
}

/// First unused `ORD-{caller}-{millis}` at or after now.
///
/// The caller's cart row is locked, so no other checkout of the same caller
/// can claim the number between the check and the insert.
async fn next_order_number(
    tx: &mut dyn Transaction,
    caller: CallerId,
) -> Result<OrderNumber, CheckoutError> {
    let now = Utc::now();
    for offset in 0..ORDER_NUMBER_ATTEMPTS {
        let number = OrderNumber::generate(caller, now + Duration::milliseconds(offset));
        if tx.order_by_number(&number, false).await?.is_none() {
            return Ok(number);
        }
    }
    Err(RepositoryError::Conflict("no free order number".to_owned()).into())
}

fn order_line(line: &CartLine) -> OrderLine {
    OrderLine {
        product_id: line.key.product_id,
        size_id: line.key.size_id,
        product_name: line.product_name.clone(),
        quantity: line.quantity,
        unit_price: line.unit_price,
    }
}

fn ledger_failure(err: LedgerError, line: &CartLine) -> CheckoutError {
    match err {
        LedgerError::InsufficientStock {
            key,
            available,
            requested,
        } => CheckoutError::InsufficientStock {
            key,
            product_name: line.product_name.clone(),
            available,
            requested,
        },
        LedgerError::NotFound(key) => CheckoutError::ProductUnavailable {
            key,
            product_name: line.product_name.clone(),
        },
        LedgerError::InvalidQuantity(quantity) => CheckoutError::Repository(
            RepositoryError::DataCorruption(format!("cart line quantity {quantity}")),
        ),
        LedgerError::Repository(e) => CheckoutError::Repository(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartwright_core::{Email, Money, OrderStatus};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::QuantityMode;
    use crate::services::cart::CartService;
    use crate::services::payments::StubGateway;

    const ALICE: CallerId = CallerId::new(1);

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient_name: "Alice Smith".to_owned(),
            phone: "0812345678".to_owned(),
            address_line1: "1 Main St".to_owned(),
            address_line2: Some("Apt 4".to_owned()),
            city: "Bangkok".to_owned(),
            state: "BKK".to_owned(),
            postal_code: "10110".to_owned(),
            country: "TH".to_owned(),
        }
    }

    fn inline(is_default: bool) -> ShippingInput {
        ShippingInput::Inline {
            address: address(),
            is_default,
            save: true,
        }
    }

    async fn add(store: &MemoryStore, key: StockKey, quantity: i32) {
        CartService::new(store)
            .upsert_item(ALICE, key, quantity, QuantityMode::Add)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_checkout_places_order() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let tee = store.add_product("Tee", Money::from_minor(1500), 5).await;
        let (hoodie, sizes) = store
            .add_sized_product("Hoodie", Money::from_minor(4500), &[("S", 2), ("M", 2)])
            .await;
        add(&store, StockKey::product(tee), 3).await;
        add(&store, StockKey::variant(hoodie, sizes[1]), 1).await;

        let caller = Caller::customer(ALICE).with_email(Email::parse("alice@example.com").unwrap());
        let receipt = CheckoutService::new(&store, &gateway)
            .checkout(&caller, inline(false))
            .await
            .unwrap();

        assert_eq!(receipt.order.status, OrderStatus::Pending);
        assert_eq!(receipt.order.total, Money::from_minor(9000));
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(
            receipt.payment,
            PaymentHandoff::Initiated {
                transaction_id: "txn-1".to_owned()
            }
        );
        assert_eq!(store.stock(StockKey::product(tee)).await, Some(2));
        assert_eq!(
            store.stock(StockKey::variant(hoodie, sizes[1])).await,
            Some(1)
        );
        assert_eq!(store.product_stock(hoodie).await, Some(3));
        assert!(
            CartService::new(&store)
                .summary(ALICE)
                .await
                .unwrap()
                .items
                .is_empty()
        );

        let sent = gateway.created();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].email, "alice@example.com");
        assert_eq!(sent[0].order_id, receipt.order.number.to_string());
        assert_eq!(sent[0].description, "Tee x3, Hoodie x1");
    }

    #[tokio::test]
    async fn test_empty_cart() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let checkout = CheckoutService::new(&store, &gateway);

        assert!(matches!(
            checkout
                .checkout(&Caller::customer(ALICE), inline(false))
                .await,
            Err(CheckoutError::EmptyCart)
        ));
        CartService::new(&store).get_or_create(ALICE).await.unwrap();
        assert!(matches!(
            checkout
                .checkout(&Caller::customer(ALICE), inline(false))
                .await,
            Err(CheckoutError::EmptyCart)
        ));
        assert!(store.addresses(ALICE).await.is_empty());
    }

    #[tokio::test]
    async fn test_shortage_rolls_everything_back() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let tee = store.add_product("Tee", Money::from_minor(1500), 5).await;
        let cap = store.add_product("Cap", Money::from_minor(500), 5).await;
        add(&store, StockKey::product(tee), 2).await;
        add(&store, StockKey::product(cap), 4).await;
        store.set_stock(StockKey::product(cap), 1).await;

        let err = CheckoutService::new(&store, &gateway)
            .checkout(&Caller::customer(ALICE), inline(true))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                ref product_name,
                available: 1,
                requested: 4,
                ..
            } if product_name == "Cap"
        ));
        assert_eq!(store.stock(StockKey::product(tee)).await, Some(5));
        assert_eq!(
            CartService::new(&store)
                .summary(ALICE)
                .await
                .unwrap()
                .total_items,
            6
        );
        assert!(store.addresses(ALICE).await.is_empty());
        assert!(store.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_mid_decrement_rolls_back() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let tee = store.add_product("Tee", Money::from_minor(1500), 5).await;
        let cap = store.add_product("Cap", Money::from_minor(500), 5).await;
        add(&store, StockKey::product(tee), 2).await;
        add(&store, StockKey::product(cap), 1).await;
        store.fail_stock_writes(StockKey::product(cap)).await;

        let err = CheckoutService::new(&store, &gateway)
            .checkout(&Caller::customer(ALICE), inline(false))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Repository(_)));
        assert_eq!(store.stock(StockKey::product(tee)).await, Some(5));
        assert!(orders(&store).await.is_empty());
        assert!(store.outbox().await.is_empty());
    }

    async fn orders(store: &MemoryStore) -> Vec<Order> {
        let mut tx = store.begin().await.unwrap();
        tx.orders_for_caller(ALICE).await.unwrap()
    }

    #[tokio::test]
    async fn test_payment_failure_keeps_order() {
        let store = MemoryStore::new();
        let gateway = StubGateway::failing();
        let tee = store.add_product("Tee", Money::from_minor(1500), 5).await;
        add(&store, StockKey::product(tee), 1).await;

        let receipt = CheckoutService::new(&store, &gateway)
            .checkout(&Caller::customer(ALICE), inline(false))
            .await
            .unwrap();

        assert!(matches!(receipt.payment, PaymentHandoff::Pending { .. }));
        assert_eq!(receipt.order.transaction_id, None);
        assert_eq!(store.stock(StockKey::product(tee)).await, Some(4));
        let outbox = store.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert!(!outbox[0].is_dispatched());
    }

    #[tokio::test]
    async fn test_saved_address_must_be_owned() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let tee = store.add_product("Tee", Money::from_minor(1500), 5).await;
        add(&store, StockKey::product(tee), 1).await;

        let bob_address = {
            let mut tx = store.begin().await.unwrap();
            let id = tx
                .insert_address(CallerId::new(2), &address(), true)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            id
        };

        assert!(matches!(
            CheckoutService::new(&store, &gateway)
                .checkout(&Caller::customer(ALICE), ShippingInput::Saved(bob_address))
                .await,
            Err(CheckoutError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_new_default_replaces_old() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let tee = store.add_product("Tee", Money::from_minor(1500), 5).await;
        let checkout = CheckoutService::new(&store, &gateway);

        add(&store, StockKey::product(tee), 1).await;
        checkout
            .checkout(&Caller::customer(ALICE), inline(true))
            .await
            .unwrap();
        add(&store, StockKey::product(tee), 1).await;
        checkout
            .checkout(&Caller::customer(ALICE), inline(true))
            .await
            .unwrap();

        let saved = store.addresses(ALICE).await;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.iter().filter(|(_, default)| *default).count(), 1);
        assert!(saved[1].1);
    }

    #[tokio::test]
    async fn test_invalid_inline_address() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let mut incomplete = address();
        incomplete.city = "  ".to_owned();

        let result = CheckoutService::new(&store, &gateway)
            .checkout(
                &Caller::customer(ALICE),
                ShippingInput::Inline {
                    address: incomplete,
                    is_default: false,
                    save: true,
                },
            )
            .await;
        assert!(matches!(result, Err(CheckoutError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_back_to_back_orders_get_distinct_numbers() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let tee = store.add_product("Tee", Money::from_minor(1500), 5).await;
        let checkout = CheckoutService::new(&store, &gateway);

        add(&store, StockKey::product(tee), 1).await;
        let first = checkout
            .checkout(&Caller::customer(ALICE), inline(false))
            .await
            .unwrap();
        add(&store, StockKey::product(tee), 1).await;
        let second = checkout
            .checkout(&Caller::customer(ALICE), inline(false))
            .await
            .unwrap();

        assert_ne!(first.order.number, second.order.number);
    }
}
