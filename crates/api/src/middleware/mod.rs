//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with method, uri, status, latency)
//! 3. Request ID (record on span, Sentry tag, response header)
//!
//! Caller identity is read per handler through [`RequireCaller`] and
//! [`RequireAdmin`].

pub mod caller;
pub mod request_id;

pub use caller::{RequireAdmin, RequireCaller};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
