//! Payment provider integration.
//!
//! Outbound calls (create, status, cancel) go through a [`PaymentGateway`].
//! Calls that follow a state change are queued in the payment outbox inside
//! the same transaction and sent by the [`OutboxDispatcher`] after commit.
//! Inbound provider notifications are handled by [`handle_webhook`].

mod client;
mod outbox;
#[cfg(test)]
mod stub;
mod types;
mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use cartwright_core::ProviderStatus;

pub use client::HttpPaymentGateway;
pub use outbox::{DispatchOutcome, OutboxDispatcher, OutboxError};
#[cfg(test)]
pub(crate) use stub::StubGateway;
pub use types::{CancelPaymentRequest, PaymentRequest, WebhookPayload};
pub use webhook::{WebhookError, WebhookOutcome, handle_webhook};

/// Errors from calls to the payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider did not answer in time.
    #[error("payment provider timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound calls to the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment and return the provider's transaction id.
    async fn create_payment(&self, request: &PaymentRequest) -> Result<String, PaymentError>;

    /// Current status of a transaction.
    async fn query_status(&self, transaction_id: &str) -> Result<ProviderStatus, PaymentError>;

    /// Ask the provider to cancel a transaction.
    async fn cancel_payment(&self, transaction_id: &str) -> Result<(), PaymentError>;
}
