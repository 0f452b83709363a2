//! Integration tests for Cartwright.
//!
//! Each test starts two servers on ephemeral ports: a stub payment provider
//! and the Cartwright API itself, backed by the in-memory store and talking
//! to the stub over HTTP. Tests then drive the API with `reqwest`, the way
//! the upstream gateway would.
//!
//! The `postgres_store` tests run the services against a real database and
//! are ignored by default.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwright-integration-tests
//!
//! # Including the database-backed tests
//! DATABASE_URL=postgres://localhost/cartwright_test \
//!     cargo test -p cartwright-integration-tests -- --include-ignored
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Value, json};
use url::Url;

use cartwright_api::db::MemoryStore;
use cartwright_api::services::HttpPaymentGateway;
use cartwright_api::state::AppState;
use cartwright_core::{Money, ProductId};

/// Calls seen by the stub payment provider.
#[derive(Default)]
pub struct ProviderLog {
    failing: AtomicBool,
    next_id: AtomicUsize,
    created: Mutex<Vec<Value>>,
    cancelled: Mutex<Vec<String>>,
}

impl ProviderLog {
    /// Make every provider call answer 503 (or recover with `false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Bodies of `create-qr` calls, in arrival order.
    pub fn created(&self) -> Vec<Value> {
        self.created.lock().unwrap().clone()
    }

    /// Transaction ids passed to `cancel`.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    fn unavailable(&self) -> Option<(StatusCode, Json<Value>)> {
        self.failing.load(Ordering::SeqCst).then(|| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"message": "provider unavailable"})),
            )
        })
    }
}

async fn create_qr(
    State(log): State<Arc<ProviderLog>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(unavailable) = log.unavailable() {
        return unavailable;
    }
    let id = log.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    log.created.lock().unwrap().push(body);
    (
        StatusCode::OK,
        Json(json!({"transactionId": format!("txn-{id}"), "qrCode": "000201"})),
    )
}

async fn status(
    State(log): State<Arc<ProviderLog>>,
    Path(_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    log.unavailable()
        .unwrap_or((StatusCode::OK, Json(json!({"status": "PENDING"}))))
}

async fn cancel(
    State(log): State<Arc<ProviderLog>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    if let Some(unavailable) = log.unavailable() {
        return unavailable;
    }
    log.cancelled.lock().unwrap().push(id);
    (StatusCode::OK, Json(json!({"status": "CANCELLED"})))
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a stub payment provider and a real HTTP gateway pointed at it.
pub async fn start_provider() -> (Arc<ProviderLog>, HttpPaymentGateway) {
    let provider = Arc::new(ProviderLog::default());
    let provider_app = Router::new()
        .route("/api/payment/create-qr", post(create_qr))
        .route("/api/payment/status/{id}", get(status))
        .route("/api/payment/cancel/{id}", post(cancel))
        .with_state(Arc::clone(&provider));
    let provider_addr = serve(provider_app).await;

    let gateway = HttpPaymentGateway::new(
        Url::parse(&format!("http://{provider_addr}/")).unwrap(),
        Duration::from_secs(5),
    )
    .unwrap();
    (provider, gateway)
}

/// A running API and payment provider pair.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub store: MemoryStore,
    pub gateway: Arc<HttpPaymentGateway>,
    pub provider: Arc<ProviderLog>,
}

impl TestContext {
    /// Start a provider stub and an API server over a fresh store.
    pub async fn start() -> Self {
        let (provider, gateway) = start_provider().await;
        let gateway = Arc::new(gateway);
        let store = MemoryStore::new();
        let state = AppState::new(Arc::new(store.clone()), gateway.clone(), None);
        let api_addr = serve(cartwright_api::router(state)).await;

        Self {
            client: Client::new(),
            base_url: format!("http://{api_addr}"),
            store,
            gateway,
            provider,
        }
    }

    /// Seed a product with a product-level stock counter.
    pub async fn product(&self, name: &str, minor: i64, stock: i32) -> ProductId {
        self.store
            .add_product(name, Money::from_minor(minor), stock)
            .await
    }

    fn request(&self, method: reqwest::Method, path: &str, caller: i32, role: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("x-caller-id", caller.to_string())
            .header("x-caller-role", role)
    }

    /// Request as a customer.
    pub fn customer(&self, method: reqwest::Method, path: &str, caller: i32) -> RequestBuilder {
        self.request(method, path, caller, "customer")
    }

    /// Request as an admin.
    pub fn admin(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.request(method, path, 900, "admin")
    }

    /// Add `quantity` of a product (and optional size) to a caller's cart.
    pub async fn add_to_cart(
        &self,
        caller: i32,
        product: ProductId,
        size: Option<i32>,
        quantity: i32,
    ) -> Response {
        self.customer(reqwest::Method::POST, "/cart/items", caller)
            .json(&json!({
                "product_id": product.as_i32(),
                "size_id": size,
                "quantity": quantity,
            }))
            .send()
            .await
            .unwrap()
    }

    /// Check out a caller's cart to a fresh inline address.
    pub async fn checkout(&self, caller: i32) -> Response {
        self.customer(reqwest::Method::POST, "/checkout", caller)
            .json(&json!({ "shipping_address": address() }))
            .send()
            .await
            .unwrap()
    }

    /// Send a payment notification.
    pub async fn webhook(&self, order: &str, transaction_id: &str, status: &str) -> Response {
        self.client
            .post(format!("{}/webhooks/payment", self.base_url))
            .json(&json!({
                "orderId": order,
                "transactionId": transaction_id,
                "status": status,
            }))
            .send()
            .await
            .unwrap()
    }
}

/// A complete shipping address.
pub fn address() -> Value {
    json!({
        "recipient_name": "Somchai Jaidee",
        "phone": "0812345678",
        "address_line1": "99 Sukhumvit Rd",
        "city": "Bangkok",
        "state": "BKK",
        "postal_code": "10110",
        "country": "TH"
    })
}

/// Read a money field from a JSON body.
pub fn money(value: &Value) -> Money {
    serde_json::from_value(value.clone()).unwrap()
}
