//! Domain models owned by the API crate.
//!
//! These sit between the store (`db`) and the services. Row types used by the
//! Postgres backend are private to `db::postgres` and convert into these.

pub mod caller;
pub mod cart;
pub mod order;
pub mod outbox;

pub use caller::Caller;
pub use cart::{CartItemRef, CartLine, CartSummary, CartSummaryLine, QuantityMode};
pub use order::{NewOrder, Order, OrderDetail, OrderFilter, OrderLine, OrderPage};
pub use outbox::{OutboxKind, OutboxMessage};
