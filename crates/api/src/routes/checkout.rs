//! Checkout route handler.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use cartwright_core::{AddressId, ShippingAddress};

use crate::error::{AppError, Result};
use crate::middleware::RequireCaller;
use crate::services::{CheckoutReceipt, CheckoutService, ShippingInput};
use crate::state::AppState;

/// Checkout request body.
///
/// Exactly one of `shipping_address_id` and `shipping_address` must be set.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address_id: Option<AddressId>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    /// Save the inline address as the caller's default.
    #[serde(default)]
    pub is_default: bool,
    /// Keep a saved copy of the inline address.
    #[serde(default)]
    pub save_address: bool,
}

impl CheckoutRequest {
    fn into_shipping(self) -> Result<ShippingInput> {
        match (self.shipping_address_id, self.shipping_address) {
            (Some(id), None) => Ok(ShippingInput::Saved(id)),
            (None, Some(address)) => Ok(ShippingInput::Inline {
                address,
                is_default: self.is_default,
                save: self.save_address || self.is_default,
            }),
            (Some(_), Some(_)) => Err(AppError::BadRequest(
                "give either shipping_address_id or shipping_address, not both".to_string(),
            )),
            (None, None) => Err(AppError::BadRequest(
                "shipping_address_id or shipping_address is required".to_string(),
            )),
        }
    }
}

/// POST /checkout
///
/// Returns 201 with the order once it is committed, whether or not the
/// payment provider could be reached.
pub async fn checkout(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>)> {
    let shipping = request.into_shipping()?;
    let receipt = CheckoutService::new(state.store(), state.gateway())
        .checkout(&caller, shipping)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
