//! Caller identity extractors.
//!
//! Authentication happens upstream. The gateway forwards the verified
//! identity as trusted headers, which these extractors read:
//!
//! - `x-caller-id` - numeric caller id (required)
//! - `x-caller-role` - `customer` or `admin` (default: `customer`)
//! - `x-caller-email` - optional email used for payment requests
//!
//! # Example
//!
//! ```rust,ignore
//! async fn handler(RequireCaller(caller): RequireCaller) -> String {
//!     format!("Hello, caller {}!", caller.id)
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::Span;

use cartwright_core::{CallerId, CallerRole, Email};

use crate::error::{AppError, set_sentry_user};
use crate::models::Caller;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";
pub const CALLER_EMAIL_HEADER: &str = "x-caller-email";

/// Extractor that requires a caller identity.
///
/// Rejects with 401 when the identity headers are missing or malformed.
pub struct RequireCaller(pub Caller);

/// Extractor that requires an admin caller.
///
/// Rejects with 401 without an identity and 403 for non-admins.
pub struct RequireAdmin(pub Caller);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn caller_from_parts(parts: &Parts) -> Result<Caller, AppError> {
    let id = header(parts, CALLER_ID_HEADER)
        .ok_or_else(|| AppError::Unauthorized("missing caller identity".to_string()))?
        .parse::<i32>()
        .map(CallerId::new)
        .map_err(|_| AppError::Unauthorized("malformed caller id".to_string()))?;

    let role = header(parts, CALLER_ROLE_HEADER)
        .map(str::parse::<CallerRole>)
        .transpose()
        .map_err(AppError::Unauthorized)?
        .unwrap_or_default();

    let email = header(parts, CALLER_EMAIL_HEADER)
        .map(Email::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Caller { id, role, email })
}

impl<S> FromRequestParts<S> for RequireCaller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = caller_from_parts(parts)?;

        Span::current().record("caller_id", caller.id.as_i32());
        set_sentry_user(&caller.id, caller.email.as_ref().map(Email::as_str));

        Ok(Self(caller))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireCaller(caller) = RequireCaller::from_request_parts(parts, state).await?;
        if !caller.is_admin() {
            return Err(AppError::Forbidden("admin role required".to_string()));
        }
        Ok(Self(caller))
    }
}
