//! Cart models.

use serde::Serialize;

use cartwright_core::{CartId, CartItemId, Money, StockKey};

/// How a quantity passed to an upsert combines with an existing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityMode {
    /// Add to the quantity already in the cart.
    #[default]
    Add,
    /// Replace the quantity already in the cart.
    Set,
}

/// A cart line joined with current catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub item_id: CartItemId,
    #[serde(flatten)]
    pub key: StockKey,
    pub quantity: i32,
    pub product_name: String,
    pub size_name: Option<String>,
    pub unit_price: Money,
    /// Stock currently available for this line's key.
    pub available: i32,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// A cart item resolved through its owning cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartItemRef {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub key: StockKey,
    pub quantity: i32,
}

/// Cart view returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub cart_id: CartId,
    pub items: Vec<CartSummaryLine>,
    /// Number of distinct lines.
    pub item_count: usize,
    /// Sum of quantities across lines.
    pub total_items: i64,
    pub total_amount: Money,
}

/// One line of a [`CartSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummaryLine {
    #[serde(flatten)]
    pub line: CartLine,
    pub line_total: Money,
}

impl CartSummary {
    #[must_use]
    pub fn new(cart_id: CartId, lines: Vec<CartLine>) -> Self {
        let total_items = lines.iter().map(|line| i64::from(line.quantity)).sum();
        let total_amount = lines.iter().map(CartLine::line_total).sum();
        let items: Vec<CartSummaryLine> = lines
            .into_iter()
            .map(|line| CartSummaryLine {
                line_total: line.line_total(),
                line,
            })
            .collect();

        Self {
            cart_id,
            item_count: items.len(),
            items,
            total_items,
            total_amount,
        }
    }
}
