//! Admin order management.
//!
//! ```text
//! GET /admin/orders?status&page&limit   - Paginated order listing
//! PUT /admin/orders/{number}/status     - Change order status
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::info;

use cartwright_core::OrderStatus;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Order, OrderFilter, OrderPage};
use crate::services::OrderService;
use crate::state::AppState;

use super::parse_order_number;

/// Query parameters for the order listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Status change request body.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// GET /admin/orders
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderPage>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;
    let filter = OrderFilter::new(status, query.page, query.limit);

    let page = OrderService::new(state.store(), state.gateway())
        .list(&filter)
        .await?;
    Ok(Json(page))
}

/// PUT /admin/orders/{number}/status
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(number): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>> {
    let number = parse_order_number(&number)?;
    let order = OrderService::new(state.store(), state.gateway())
        .update_status(&number, &request.status)
        .await?;
    info!(admin = %admin.id, order = %order.number, status = %order.status, "Order status set by admin");
    Ok(Json(order))
}
