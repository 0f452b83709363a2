//! Customer order route handlers.
//!
//! ```text
//! GET  /orders                   - Caller's orders, newest first
//! GET  /orders/{number}          - Order detail with payment status
//! POST /orders/{number}/cancel   - Cancel a pending order
//! ```

use axum::{
    Json,
    extract::{Path, State},
};

use crate::error::Result;
use crate::middleware::RequireCaller;
use crate::models::{Order, OrderDetail};
use crate::services::OrderService;
use crate::state::AppState;

use super::parse_order_number;

/// GET /orders
pub async fn list(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderService::new(state.store(), state.gateway())
        .list_for_caller(caller.id)
        .await?;
    Ok(Json(orders))
}

/// GET /orders/{number}
pub async fn detail(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Path(number): Path<String>,
) -> Result<Json<OrderDetail>> {
    let number = parse_order_number(&number)?;
    let detail = OrderService::new(state.store(), state.gateway())
        .detail(&caller, &number)
        .await?;
    Ok(Json(detail))
}

/// POST /orders/{number}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Path(number): Path<String>,
) -> Result<Json<Order>> {
    let number = parse_order_number(&number)?;
    let order = OrderService::new(state.store(), state.gateway())
        .cancel(caller.id, &number)
        .await?;
    Ok(Json(order))
}
