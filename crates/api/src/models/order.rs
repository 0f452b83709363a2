//! Order models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use cartwright_core::{
    CallerId, Money, OrderId, OrderNumber, OrderStatus, PaymentStatus, ProductId,
    ShippingAddress, SizeId, StockKey,
};

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    #[serde(skip)]
    pub id: OrderId,
    pub number: OrderNumber,
    pub caller_id: CallerId,
    pub total: Money,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Money,
}

impl OrderLine {
    #[must_use]
    pub const fn key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id,
            size_id: self.size_id,
        }
    }

    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Everything needed to insert an order and its lines.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: OrderNumber,
    pub caller_id: CallerId,
    pub shipping_address: ShippingAddress,
    pub lines: Vec<OrderLine>,
}

impl NewOrder {
    /// Sum of the captured extended prices.
    #[must_use]
    pub fn total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }
}

/// Order with its lines and the provider's view of the payment.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLine>,
    pub payment_status: PaymentStatus,
}

/// Filter and pagination for the admin order listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub page: i64,
    pub limit: i64,
}

impl OrderFilter {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    /// Build a filter, normalizing out-of-range paging values.
    ///
    /// Pages below 1 become 1; limits outside `1..=100` fall back to 10.
    #[must_use]
    pub fn new(status: Option<OrderStatus>, page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit
            .filter(|l| (1..=Self::MAX_LIMIT).contains(l))
            .unwrap_or(Self::DEFAULT_LIMIT);
        Self {
            status,
            page,
            limit,
        }
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// One page of the admin order listing.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl OrderPage {
    #[must_use]
    pub fn new(orders: Vec<Order>, filter: &OrderFilter, total: i64) -> Self {
        Self {
            orders,
            page: filter.page,
            limit: filter.limit,
            total,
            total_pages: (total + filter.limit - 1) / filter.limit,
        }
    }
}
