//! Core types for Cartwright.
//!
//! This module provides type-safe wrappers for the order-fulfillment domain.

pub mod address;
pub mod email;
pub mod id;
pub mod money;
pub mod order_number;
pub mod status;
pub mod stock;

pub use address::{AddressError, ShippingAddress};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use order_number::{OrderNumber, OrderNumberError};
pub use status::*;
pub use stock::StockKey;
