//! Payment outbox command.
//!
//! Sends provider calls that were queued but never delivered, e.g. because
//! the provider was down or the API process stopped right after a commit.
//!
//! # Environment Variables
//!
//! Same as the API server: database URL and `PAYMENT_*` settings.

use cartwright_api::config::{ApiConfig, ConfigError};
use cartwright_api::db;
use cartwright_api::services::PaymentError;
use cartwright_api::services::payments::{DispatchOutcome, OutboxDispatcher, OutboxError};
use cartwright_api::state::AppState;
use thiserror::Error;

/// Errors that can occur while dispatching.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payment client error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    #[error("{failed} of {total} messages failed")]
    Incomplete { failed: usize, total: usize },
}

/// Dispatch up to `limit` pending messages.
///
/// Fails when any message could not be delivered so schedulers notice.
pub async fn dispatch(limit: i64) -> Result<(), DispatchError> {
    let config = ApiConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    let state = AppState::from_config(&config, pool)?;

    let outcomes = OutboxDispatcher::new(state.store(), state.gateway())
        .dispatch_pending(limit)
        .await?;

    let total = outcomes.len();
    let mut failed = 0;
    for (id, outcome) in outcomes {
        match outcome {
            DispatchOutcome::PaymentCreated { transaction_id } => {
                tracing::info!(outbox = %id, %transaction_id, "Payment created");
            }
            DispatchOutcome::PaymentCancelled => {
                tracing::info!(outbox = %id, "Payment cancelled");
            }
            DispatchOutcome::PaymentDiscarded {
                transaction_id,
                cancel,
            } => {
                tracing::warn!(
                    outbox = %id,
                    %transaction_id,
                    %cancel,
                    "Payment created for a cancelled order, cancellation queued"
                );
            }
            DispatchOutcome::AlreadyDispatched => {
                tracing::info!(outbox = %id, "Already dispatched");
            }
            DispatchOutcome::InFlight => {
                tracing::info!(outbox = %id, "Claimed by another dispatcher");
            }
            DispatchOutcome::Superseded => {
                tracing::info!(outbox = %id, "No longer needed");
            }
            DispatchOutcome::Failed { error } => {
                failed += 1;
                tracing::warn!(outbox = %id, %error, "Dispatch failed");
            }
        }
    }

    tracing::info!(total, failed, "Outbox dispatch complete");
    if failed > 0 {
        return Err(DispatchError::Incomplete { failed, total });
    }
    Ok(())
}
