//! Payment provider wire types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartwright_core::Email;

use crate::models::{Order, OrderLine};

/// Body of `POST /api/payment/create-qr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub address: String,
    pub message: String,
    pub fee_type: String,
    pub order_id: String,
    pub payment_type: String,
    pub agreement: i32,
}

impl PaymentRequest {
    pub const FEE_TYPE: &'static str = "include";
    pub const PAYMENT_TYPE: &'static str = "QRNONE";

    /// Build the request for a freshly created order.
    #[must_use]
    pub fn for_order(order: &Order, lines: &[OrderLine], email: Option<&Email>) -> Self {
        let description = lines
            .iter()
            .map(|line| format!("{} x{}", line.product_name, line.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        let address = &order.shipping_address;

        Self {
            firstname: address.recipient_name.clone(),
            lastname: String::new(),
            email: email.map(|e| e.as_str().to_owned()).unwrap_or_default(),
            phone: address.phone.clone(),
            amount: order.total.amount(),
            description,
            address: address.one_line(),
            message: format!("Order: {}", order.number),
            fee_type: Self::FEE_TYPE.to_owned(),
            order_id: order.number.to_string(),
            payment_type: Self::PAYMENT_TYPE.to_owned(),
            agreement: 1,
        }
    }
}

/// Outbox payload for a provider-side cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPaymentRequest {
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreatePaymentResponse {
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusResponse {
    pub status: String,
}

/// Provider notification about a transaction.
///
/// Missing fields deserialize as empty and are rejected by
/// [`WebhookPayload::missing_fields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

impl WebhookPayload {
    /// Names of required fields that are missing or blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("orderId", &self.order_id),
            ("transactionId", &self.transaction_id),
            ("status", &self.status),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
