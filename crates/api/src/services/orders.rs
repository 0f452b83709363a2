//! Order lifecycle.
//!
//! ```text
//! pending -> paid -> shipped -> delivered
//!    \________\________\
//!                       -> cancelled
//! ```
//!
//! Entering `cancelled` releases every line's stock and drops any payment
//! request still waiting in the outbox. Leaving `cancelled` re-reserves all
//! of it or fails with nothing changed. Status and stock are always written
//! in the same transaction.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use cartwright_core::{CallerId, OrderNumber, OrderStatus, PaymentStatus, StockKey};

use super::inventory::{LedgerError, release_in, reserve_in};
use super::payments::{
    CancelPaymentRequest, DispatchOutcome, OutboxDispatcher, PaymentGateway,
};
use crate::db::{RepositoryError, Store, Transaction};
use crate::models::{Caller, Order, OrderDetail, OrderFilter, OrderLine, OrderPage, OutboxKind};

/// Errors from order queries and transitions.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("only pending orders can be cancelled, order is {0}")]
    NotCancellable(OrderStatus),

    #[error("insufficient stock for {key}: available {available}, requested {requested}")]
    InsufficientStock {
        key: StockKey,
        available: i32,
        requested: i32,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<LedgerError> for OrderError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock {
                key,
                available,
                requested,
            } => Self::InsufficientStock {
                key,
                available,
                requested,
            },
            LedgerError::NotFound(key) => Self::InsufficientStock {
                key,
                available: 0,
                requested: 0,
            },
            LedgerError::InvalidQuantity(quantity) => Self::Repository(
                RepositoryError::DataCorruption(format!("order line quantity {quantity}")),
            ),
            LedgerError::Repository(e) => Self::Repository(e),
        }
    }
}

/// Outcome of a status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order already had the requested status.
    Unchanged(OrderStatus),
    Changed { from: OrderStatus, to: OrderStatus },
}

impl Transition {
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        match self {
            Self::Unchanged(status) | Self::Changed { to: status, .. } => *status,
        }
    }
}

fn quantities_by_key(lines: &[OrderLine]) -> BTreeMap<StockKey, i32> {
    let mut totals = BTreeMap::new();
    for line in lines {
        *totals.entry(line.key()).or_insert(0) += line.quantity;
    }
    totals
}

/// Move `order` to `target` inside `tx`, adjusting stock as needed.
///
/// The order row should already be locked by the caller.
///
/// # Errors
///
/// `InvalidTransition` for moves the lifecycle does not allow and
/// `InsufficientStock` when leaving `cancelled` without enough stock for
/// every line. Nothing is written in either case.
pub async fn transition_in(
    tx: &mut dyn Transaction,
    order: &Order,
    target: OrderStatus,
) -> Result<Transition, OrderError> {
    let from = order.status;
    if from == target {
        return Ok(Transition::Unchanged(from));
    }
    if from == OrderStatus::Delivered {
        return Err(OrderError::InvalidTransition { from, to: target });
    }

    if from == OrderStatus::Cancelled {
        let wanted = quantities_by_key(&tx.order_lines(order.id).await?);
        for (key, requested) in &wanted {
            let available = tx.lock_stock(*key).await?.unwrap_or(0);
            if available < *requested {
                return Err(OrderError::InsufficientStock {
                    key: *key,
                    available,
                    requested: *requested,
                });
            }
        }
        for (key, quantity) in wanted {
            reserve_in(tx, key, quantity).await?;
        }
    } else if target == OrderStatus::Cancelled {
        let held = quantities_by_key(&tx.order_lines(order.id).await?);
        for (key, quantity) in held {
            match release_in(tx, key, quantity).await {
                Ok(_) => {}
                Err(LedgerError::NotFound(_)) => {
                    warn!(order = %order.number, %key, quantity, "Stock counter gone, release skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let superseded = tx
            .supersede_outbox(order.id, OutboxKind::CreatePayment)
            .await?;
        if superseded > 0 {
            info!(order = %order.number, superseded, "Unsent payment request dropped");
        }
    } else if from.next() != Some(target) {
        return Err(OrderError::InvalidTransition { from, to: target });
    }

    tx.set_order_status(order.id, target).await?;
    info!(order = %order.number, %from, to = %target, "Order status changed");
    Ok(Transition::Changed { from, to: target })
}

/// Order queries, customer cancellation and administrative status changes.
pub struct OrderService<'a> {
    store: &'a dyn Store,
    gateway: &'a dyn PaymentGateway,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, gateway: &'a dyn PaymentGateway) -> Self {
        Self { store, gateway }
    }

    /// Set an order's status by name.
    ///
    /// # Errors
    ///
    /// `InvalidStatus` for an unknown status name, `NotFound`,
    /// `InvalidTransition` or `InsufficientStock` otherwise.
    #[instrument(skip(self), fields(order = %number))]
    pub async fn update_status(
        &self,
        number: &OrderNumber,
        status: &str,
    ) -> Result<Order, OrderError> {
        let target: OrderStatus = status
            .parse()
            .map_err(|_| OrderError::InvalidStatus(status.to_owned()))?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .order_by_number(number, true)
            .await?
            .ok_or(OrderError::NotFound)?;
        let transition = transition_in(tx.as_mut(), &order, target).await?;
        tx.commit().await?;

        order.status = transition.status();
        Ok(order)
    }

    /// Cancel one of the caller's pending orders.
    ///
    /// Stock is released in the same transaction. When the order already has
    /// a payment transaction, a provider cancellation is queued and
    /// dispatched after commit.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or foreign orders, `NotCancellable` unless
    /// the order is pending.
    #[instrument(skip(self, caller), fields(caller = %caller, order = %number))]
    pub async fn cancel(&self, caller: CallerId, number: &OrderNumber) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .order_by_number(number, true)
            .await?
            .filter(|order| order.caller_id == caller)
            .ok_or(OrderError::NotFound)?;
        if order.status != OrderStatus::Pending {
            return Err(OrderError::NotCancellable(order.status));
        }

        transition_in(tx.as_mut(), &order, OrderStatus::Cancelled).await?;
        let outbox = match order.transaction_id.as_deref() {
            Some(transaction_id) => {
                let payload = serde_json::to_value(CancelPaymentRequest {
                    transaction_id: transaction_id.to_owned(),
                })
                .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
                Some(
                    tx.enqueue_outbox(order.id, OutboxKind::CancelPayment, payload)
                        .await?,
                )
            }
            None => None,
        };
        tx.commit().await?;
        order.status = OrderStatus::Cancelled;

        if let Some(id) = outbox {
            match OutboxDispatcher::new(self.store, self.gateway)
                .dispatch(id)
                .await
            {
                Ok(DispatchOutcome::Failed { error }) => {
                    warn!(outbox = %id, %error, "Payment cancellation left in outbox");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(outbox = %id, error = %e, "Failed to dispatch payment cancellation");
                }
            }
        }

        Ok(order)
    }

    /// One order with its lines and the provider's view of the payment.
    ///
    /// Customers only see their own orders; admins see all of them.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or foreign orders. Provider failures never
    /// fail the call; they show up as an `unknown` payment status.
    #[instrument(skip(self, caller), fields(caller = %caller.id, order = %number))]
    pub async fn detail(
        &self,
        caller: &Caller,
        number: &OrderNumber,
    ) -> Result<OrderDetail, OrderError> {
        let (order, items) = {
            let mut tx = self.store.begin().await?;
            let order = tx
                .order_by_number(number, false)
                .await?
                .filter(|order| caller.is_admin() || order.caller_id == caller.id)
                .ok_or(OrderError::NotFound)?;
            let items = tx.order_lines(order.id).await?;
            (order, items)
        };

        let payment_status = match order.transaction_id.as_deref() {
            None => PaymentStatus::NotInitiated,
            Some(transaction_id) => match self.gateway.query_status(transaction_id).await {
                Ok(status) => PaymentStatus::Reported(status),
                Err(e) => {
                    warn!(error = %e, "Payment status query failed");
                    PaymentStatus::Unknown
                }
            },
        };

        Ok(OrderDetail {
            order,
            items,
            payment_status,
        })
    }

    /// The caller's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_for_caller(&self, caller: CallerId) -> Result<Vec<Order>, OrderError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.orders_for_caller(caller).await?)
    }

    /// A page of all orders, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<OrderPage, OrderError> {
        let mut tx = self.store.begin().await?;
        let (orders, total) = tx.list_orders(filter).await?;
        Ok(OrderPage::new(orders, filter, total))
    }
}
