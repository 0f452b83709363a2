//! Cartwright Core - Shared domain types.
//!
//! This crate provides the types shared by every Cartwright component:
//! - `api` - The order-fulfillment HTTP service (carts, checkout, orders, payments)
//! - `cli` - Command-line tools for migrations and outbox dispatch
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. Database encoding is available behind the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, money, statuses, order numbers, stock keys and
//!   shipping addresses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
