//! Inbound payment notifications.

use thiserror::Error;
use tracing::{info, instrument};

use cartwright_core::{OrderNumber, OrderStatus, ProviderStatus};

use super::WebhookPayload;
use crate::db::{RepositoryError, Store};
use crate::services::orders::{OrderError, Transition, transition_in};

/// Errors from webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// No order matches both the order number and the transaction id.
    #[error("order not found")]
    OrderNotFound,

    /// The order is pending but its transaction id is not stored yet.
    #[error("payment for this order is still being recorded")]
    PaymentNotRecorded,

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl From<RepositoryError> for WebhookError {
    fn from(err: RepositoryError) -> Self {
        Self::Order(OrderError::Repository(err))
    }
}

/// What a notification did to its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { from: OrderStatus, to: OrderStatus },
    /// The order was already where the notification would put it.
    Unchanged(OrderStatus),
    /// The provider status carries no transition.
    Ignored(ProviderStatus),
}

/// Apply a provider notification to its order.
///
/// Re-delivered notifications are no-ops. A success notification for an
/// order that has already moved past `paid` changes nothing.
///
/// # Errors
///
/// `MissingFields` for incomplete payloads, `OrderNotFound` when no order
/// matches both the number and the transaction id, `PaymentNotRecorded`
/// when the order is pending without a transaction id yet, and the
/// lifecycle's errors when the transition is not allowed.
#[instrument(skip(store, payload), fields(order = %payload.order_id, status = %payload.status))]
pub async fn handle_webhook(
    store: &dyn Store,
    payload: &WebhookPayload,
) -> Result<WebhookOutcome, WebhookError> {
    let missing = payload.missing_fields();
    if !missing.is_empty() {
        return Err(WebhookError::MissingFields(missing));
    }
    let number =
        OrderNumber::parse(&payload.order_id).map_err(|_| WebhookError::OrderNotFound)?;
    let provider_status = ProviderStatus::parse(&payload.status);

    let mut tx = store.begin().await?;
    let order = tx
        .order_by_number(&number, true)
        .await?
        .ok_or(WebhookError::OrderNotFound)?;
    match order.transaction_id.as_deref() {
        Some(transaction_id) if transaction_id == payload.transaction_id.trim() => {}
        None if order.status == OrderStatus::Pending => {
            return Err(WebhookError::PaymentNotRecorded);
        }
        _ => return Err(WebhookError::OrderNotFound),
    }

    let Some(target) = provider_status.target_order_status() else {
        info!(%provider_status, "Provider status carries no transition");
        return Ok(WebhookOutcome::Ignored(provider_status));
    };
    if target == OrderStatus::Paid
        && matches!(order.status, OrderStatus::Shipped | OrderStatus::Delivered)
    {
        return Ok(WebhookOutcome::Unchanged(order.status));
    }

    let outcome = match transition_in(tx.as_mut(), &order, target).await? {
        Transition::Unchanged(status) => WebhookOutcome::Unchanged(status),
        Transition::Changed { from, to } => WebhookOutcome::Applied { from, to },
    };
    tx.commit().await?;
    Ok(outcome)
}
