//! HTTP client for the payment provider.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use cartwright_core::ProviderStatus;

use super::types::{CreatePaymentResponse, StatusResponse};
use super::{PaymentError, PaymentGateway, PaymentRequest};

/// Payment provider reached over JSON/HTTP.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpPaymentGateway {
    /// Create a client for the provider at `base_url`.
    ///
    /// Every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build or the URL cannot
    /// carry a path.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, PaymentError> {
        if base_url.cannot_be_a_base() {
            return Err(PaymentError::Parse(format!(
                "payment base URL cannot carry a path: {base_url}"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "payment"]).extend(segments);
        }
        url
    }

    fn transport(&self, err: reqwest::Error) -> PaymentError {
        if err.is_timeout() {
            PaymentError::Timeout(self.timeout)
        } else {
            PaymentError::Http(err)
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order = %request.order_id))]
    async fn create_payment(&self, request: &PaymentRequest) -> Result<String, PaymentError> {
        let response = self
            .client
            .post(self.endpoint(&["create-qr"]))
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let body: CreatePaymentResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;

        let transaction_id = body
            .transaction_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PaymentError::Parse("response has no transactionId".to_owned()))?;
        debug!(%transaction_id, "Payment created");
        Ok(transaction_id)
    }

    #[instrument(skip(self))]
    async fn query_status(&self, transaction_id: &str) -> Result<ProviderStatus, PaymentError> {
        let response = self
            .client
            .get(self.endpoint(&["status", transaction_id]))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let body: StatusResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;
        Ok(ProviderStatus::parse(&body.status))
    }

    #[instrument(skip(self))]
    async fn cancel_payment(&self, transaction_id: &str) -> Result<(), PaymentError> {
        let response = self
            .client
            .post(self.endpoint(&["cancel", transaction_id]))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        Self::check(response).await?;
        debug!("Payment cancelled");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(app: Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            firstname: "Alice".to_owned(),
            lastname: String::new(),
            email: "alice@example.com".to_owned(),
            phone: "0800000000".to_owned(),
            amount: Decimal::new(3000, 2),
            description: "Tee x3".to_owned(),
            address: "1 Main St, Bangkok 10110".to_owned(),
            message: "Order: ORD-1-1".to_owned(),
            fee_type: PaymentRequest::FEE_TYPE.to_owned(),
            order_id: "ORD-1-1".to_owned(),
            payment_type: PaymentRequest::PAYMENT_TYPE.to_owned(),
            agreement: 1,
        }
    }

    #[test]
    fn test_endpoint_paths() {
        let gateway = HttpPaymentGateway::new(
            Url::parse("http://pay.local:8088/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            gateway.endpoint(&["create-qr"]).as_str(),
            "http://pay.local:8088/api/payment/create-qr"
        );
        assert_eq!(
            gateway.endpoint(&["status", "a/b"]).as_str(),
            "http://pay.local:8088/api/payment/status/a%2Fb"
        );
    }

    #[tokio::test]
    async fn test_create_payment_returns_transaction_id() {
        let app = Router::new().route(
            "/api/payment/create-qr",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["orderId"], "ORD-1-1");
                assert_eq!(body["amount"], 30.0);
                Json(json!({ "transactionId": "txn-42", "qr": "..." }))
            }),
        );
        let gateway = HttpPaymentGateway::new(serve(app).await, Duration::from_secs(5)).unwrap();

        assert_eq!(gateway.create_payment(&request()).await.unwrap(), "txn-42");
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let app = Router::new().route(
            "/api/payment/create-qr",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let gateway = HttpPaymentGateway::new(serve(app).await, Duration::from_secs(5)).unwrap();

        let err = gateway.create_payment(&request()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Api { status: 503, ref message } if message == "down"));
    }

    #[tokio::test]
    async fn test_missing_transaction_id_is_parse_error() {
        let app = Router::new().route(
            "/api/payment/create-qr",
            post(|| async { Json(json!({ "ok": true })) }),
        );
        let gateway = HttpPaymentGateway::new(serve(app).await, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            gateway.create_payment(&request()).await,
            Err(PaymentError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let app = Router::new().route(
            "/api/payment/create-qr",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "transactionId": "late" }))
            }),
        );
        let gateway =
            HttpPaymentGateway::new(serve(app).await, Duration::from_millis(100)).unwrap();

        assert!(matches!(
            gateway.create_payment(&request()).await,
            Err(PaymentError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_status_and_cancel() {
        let app = Router::new()
            .route(
                "/api/payment/status/{id}",
                get(|Path(id): Path<String>| async move {
                    let status = if id == "txn-1" { "success" } else { "PROCESSING" };
                    Json(json!({ "status": status }))
                }),
            )
            .route(
                "/api/payment/cancel/{id}",
                post(|Path(id): Path<String>| async move {
                    if id == "txn-1" {
                        StatusCode::OK
                    } else {
                        StatusCode::NOT_FOUND
                    }
                }),
            );
        let gateway = HttpPaymentGateway::new(serve(app).await, Duration::from_secs(5)).unwrap();

        assert_eq!(
            gateway.query_status("txn-1").await.unwrap(),
            ProviderStatus::Success
        );
        assert_eq!(
            gateway.query_status("txn-2").await.unwrap(),
            ProviderStatus::Other("PROCESSING".to_owned())
        );
        gateway.cancel_payment("txn-1").await.unwrap();
        assert!(matches!(
            gateway.cancel_payment("txn-2").await,
            Err(PaymentError::Api { status: 404, .. })
        ));
    }
}
