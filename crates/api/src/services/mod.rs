//! Business logic for carts, checkout, orders and payments.
//!
//! Services borrow a [`Store`](crate::db::Store) (and, where the payment
//! provider is involved, a [`PaymentGateway`]) for the duration of a call.

pub mod cart;
pub mod checkout;
pub mod inventory;
pub mod orders;
pub mod payments;

pub use cart::{CartError, CartService};
pub use checkout::{CheckoutError, CheckoutReceipt, CheckoutService, PaymentHandoff, ShippingInput};
pub use inventory::{InventoryLedger, LedgerError};
pub use orders::{OrderError, OrderService, Transition};
pub use payments::{HttpPaymentGateway, PaymentError, PaymentGateway};
