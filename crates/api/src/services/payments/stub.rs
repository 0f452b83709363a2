//! In-process gateway for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use cartwright_core::ProviderStatus;

use super::{PaymentError, PaymentGateway, PaymentRequest};

#[derive(Default)]
pub(crate) struct StubGateway {
    failing: bool,
    status: Option<ProviderStatus>,
    created: Mutex<Vec<PaymentRequest>>,
    cancelled: Mutex<Vec<String>>,
}

#[allow(clippy::unwrap_used)]
impl StubGateway {
    /// A gateway whose every call fails.
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_status(mut self, status: ProviderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn created(&self) -> Vec<PaymentRequest> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    fn unavailable(&self) -> Result<(), PaymentError> {
        if self.failing {
            return Err(PaymentError::Api {
                status: 503,
                message: "unavailable".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
#[allow(clippy::unwrap_used)]
impl PaymentGateway for StubGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<String, PaymentError> {
        self.unavailable()?;
        // Suspend once, like a network call.
        tokio::task::yield_now().await;
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(format!("txn-{}", created.len()))
    }

    async fn query_status(&self, _transaction_id: &str) -> Result<ProviderStatus, PaymentError> {
        self.unavailable()?;
        self.status
            .clone()
            .ok_or_else(|| PaymentError::Parse("no status configured".to_owned()))
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<(), PaymentError> {
        self.unavailable()?;
        self.cancelled
            .lock()
            .unwrap()
            .push(transaction_id.to_owned());
        Ok(())
    }
}
