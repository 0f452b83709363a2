//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::{PgStore, Store};
use crate::services::{HttpPaymentGateway, PaymentError, PaymentGateway};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Handlers build services on
/// top of the store and gateway it holds.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: Option<SecretString>,
}

impl AppState {
    /// Create application state from explicit collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: Option<SecretString>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                gateway,
                webhook_secret,
            }),
        }
    }

    /// Create application state backed by `PostgreSQL` and the HTTP payment
    /// provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the payment client cannot be built.
    pub fn from_config(config: &ApiConfig, pool: PgPool) -> Result<Self, PaymentError> {
        let gateway =
            HttpPaymentGateway::new(config.payment.base_url.clone(), config.payment.timeout)?;
        Ok(Self::new(
            Arc::new(PgStore::new(pool)),
            Arc::new(gateway),
            config.payment.webhook_secret.clone(),
        ))
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the payment gateway.
    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    /// Shared secret inbound webhooks must present, if configured.
    #[must_use]
    pub fn webhook_secret(&self) -> Option<&SecretString> {
        self.inner.webhook_secret.as_ref()
    }
}
