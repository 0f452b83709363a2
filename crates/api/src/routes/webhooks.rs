//! Payment provider webhook.

use axum::{Json, extract::State, http::HeaderMap};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::warn;

use cartwright_core::OrderStatus;

use crate::error::{AppError, Result};
use crate::services::payments::{WebhookOutcome, WebhookPayload, handle_webhook};
use crate::state::AppState;

/// Header carrying the shared webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// `applied`, `unchanged` or `ignored`.
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Applied { to, .. } => Self {
                result: "applied",
                status: Some(to),
            },
            WebhookOutcome::Unchanged(status) => Self {
                result: "unchanged",
                status: Some(status),
            },
            WebhookOutcome::Ignored(_) => Self {
                result: "ignored",
                status: None,
            },
        }
    }
}

fn verify_secret(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.webhook_secret() else {
        return Ok(());
    };
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected.expose_secret()) {
        warn!("Webhook rejected: bad or missing secret");
        return Err(AppError::Unauthorized("invalid webhook secret".to_string()));
    }
    Ok(())
}

/// POST /webhooks/payment
///
/// Unknown orders answer 404 and transition conflicts 409; store failures
/// answer 500 so the provider retries.
pub async fn payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookResponse>> {
    verify_secret(&state, &headers)?;
    let outcome = handle_webhook(state.store(), &payload).await?;
    Ok(Json(outcome.into()))
}
