//! Cart route handlers.
//!
//! ```text
//! GET    /cart               - Cart summary
//! POST   /cart/items         - Add to cart
//! PUT    /cart/items/{id}    - Set line quantity (0 removes the line)
//! DELETE /cart/items/{id}    - Remove line
//! DELETE /cart               - Empty the cart
//! ```

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use cartwright_core::{CartItemId, ProductId, SizeId, StockKey};

use crate::error::Result;
use crate::middleware::RequireCaller;
use crate::models::{CartSummary, QuantityMode};
use crate::services::CartService;
use crate::state::AppState;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub size_id: Option<SizeId>,
    pub quantity: i32,
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct AddItemResponse {
    pub item_id: CartItemId,
}

/// GET /cart
pub async fn show(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
) -> Result<Json<CartSummary>> {
    let summary = CartService::new(state.store()).summary(caller.id).await?;
    Ok(Json(summary))
}

/// POST /cart/items
///
/// Adds to the quantity when the product (and size) is already in the cart.
pub async fn add_item(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Json(request): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<AddItemResponse>)> {
    let key = StockKey {
        product_id: request.product_id,
        size_id: request.size_id,
    };
    let item_id = CartService::new(state.store())
        .upsert_item(caller.id, key, request.quantity, QuantityMode::Add)
        .await?;
    Ok((StatusCode::CREATED, Json(AddItemResponse { item_id })))
}

/// PUT /cart/items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Path(id): Path<i32>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartSummary>> {
    let service = CartService::new(state.store());
    service
        .set_item_quantity(caller.id, CartItemId::new(id), request.quantity)
        .await?;
    Ok(Json(service.summary(caller.id).await?))
}

/// DELETE /cart/items/{id}
pub async fn remove_item(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Path(id): Path<i32>,
) -> Result<StatusCode> {
    CartService::new(state.store())
        .remove_item(caller.id, CartItemId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart
pub async fn clear(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
) -> Result<StatusCode> {
    CartService::new(state.store()).clear(caller.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
