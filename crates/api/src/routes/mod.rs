//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                         - Liveness
//! GET    /health/ready                   - Readiness (store ping)
//!
//! # Cart
//! GET    /cart                           - Cart summary
//! POST   /cart/items                     - Add item
//! PUT    /cart/items/{id}                - Set item quantity
//! DELETE /cart/items/{id}                - Remove item
//! DELETE /cart                           - Clear cart
//!
//! # Checkout and orders
//! POST   /checkout                       - Place order from cart
//! GET    /orders                         - Caller's orders
//! GET    /orders/{number}                - Order detail
//! POST   /orders/{number}/cancel         - Cancel pending order
//!
//! # Admin (requires admin role)
//! GET    /admin/orders                   - Order listing
//! PUT    /admin/orders/{number}/status   - Change status
//!
//! # Payment provider
//! POST   /webhooks/payment               - Payment notification
//! ```

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post, put},
};

use cartwright_core::OrderNumber;

use crate::error::AppError;
use crate::services::OrderError;
use crate::state::AppState;

/// Create the application routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/cart", get(cart::show).delete(cart::clear))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/{id}",
            put(cart::update_item).delete(cart::remove_item),
        )
        .route("/checkout", post(checkout::checkout))
        .route("/orders", get(orders::list))
        .route("/orders/{number}", get(orders::detail))
        .route("/orders/{number}/cancel", post(orders::cancel))
        .nest("/admin", admin_routes())
        .route("/webhooks/payment", post(webhooks::payment))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/{number}/status", put(admin::update_status))
}

/// Malformed order numbers cannot name an order, so they read as not found.
fn parse_order_number(raw: &str) -> Result<OrderNumber, AppError> {
    OrderNumber::parse(raw).map_err(|_| AppError::Order(OrderError::NotFound))
}
