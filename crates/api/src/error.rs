//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before the response is built and their details never
//! reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::payments::WebhookError;
use crate::services::{CartError, CheckoutError, OrderError};

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Store operation failed outside a service.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Caller identity missing or malformed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is known but lacks the role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

const fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotFound => StatusCode::NOT_FOUND,
        OrderError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        OrderError::InvalidTransition { .. }
        | OrderError::NotCancellable(_)
        | OrderError::InsufficientStock { .. } => StatusCode::CONFLICT,
        OrderError::Repository(e) => repository_status(e),
    }
}

impl AppError {
    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(e) => repository_status(e),
            Self::Cart(e) => match e {
                CartError::Validation(_) => StatusCode::BAD_REQUEST,
                CartError::ProductNotFound(_) | CartError::NotFound => StatusCode::NOT_FOUND,
                CartError::QuantityExceedsStock { .. } => StatusCode::CONFLICT,
                CartError::Repository(e) => repository_status(e),
            },
            Self::Checkout(e) => match e {
                CheckoutError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
                CheckoutError::EmptyCart
                | CheckoutError::InsufficientStock { .. }
                | CheckoutError::ProductUnavailable { .. } => StatusCode::CONFLICT,
                CheckoutError::Repository(e) => repository_status(e),
            },
            Self::Order(e) => order_status(e),
            Self::Webhook(e) => match e {
                WebhookError::MissingFields(_) => StatusCode::BAD_REQUEST,
                WebhookError::OrderNotFound => StatusCode::NOT_FOUND,
                WebhookError::PaymentNotRecorded => StatusCode::CONFLICT,
                WebhookError::Order(e) => order_status(e),
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        let message = if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
            // Don't expose internal error details to clients
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(caller_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(caller_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}
