//! Orders and order items.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;

use cartwright_core::{
    CallerId, Money, OrderId, OrderNumber, OrderStatus, ProductId, ShippingAddress, SizeId,
};

use super::PgTransaction;
use crate::db::{OrderOps, RepositoryError};
use crate::models::{NewOrder, Order, OrderFilter, OrderLine};

const ORDER_COLUMNS: &str = r"
    id, number, caller_id, total, status, shipping_address, transaction_id,
    created_at, updated_at
";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    number: OrderNumber,
    caller_id: i32,
    total: Decimal,
    status: OrderStatus,
    shipping_address: Json<ShippingAddress>,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            number: row.number,
            caller_id: CallerId::new(row.caller_id),
            total: Money::new(row.total),
            status: row.status,
            shipping_address: row.shipping_address.0,
            transaction_id: row.transaction_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    product_id: i32,
    size_id: Option<i32>,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl From<OrderLineRow> for OrderLine {
    fn from(row: OrderLineRow) -> Self {
        Self {
            product_id: ProductId::new(row.product_id),
            size_id: row.size_id.map(SizeId::new),
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: Money::new(row.unit_price),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

#[async_trait]
impl OrderOps for PgTransaction {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO shop.orders (number, caller_id, total, status, shipping_address)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.number)
        .bind(order.caller_id)
        .bind(order.total())
        .bind(Json(&order.shipping_address))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::unique_as_conflict(e, "order number"))?;

        for line in &order.lines {
            sqlx::query(
                r"
                INSERT INTO shop.order_item (order_id, product_id, size_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(row.id)
            .bind(line.product_id)
            .bind(line.size_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(row.into())
    }

    async fn order_by_number(
        &mut self,
        number: &OrderNumber,
        lock: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        let suffix = if lock { "FOR UPDATE" } else { "" };
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE number = $1 {suffix}"
        ))
        .bind(number)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn order_by_id(
        &mut self,
        order: OrderId,
        lock: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        let suffix = if lock { "FOR UPDATE" } else { "" };
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1 {suffix}"
        ))
        .bind(order)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<OrderLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r"
            SELECT product_id, size_id, product_name, quantity, unit_price
            FROM shop.order_item
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(OrderLine::from).collect())
    }

    async fn set_order_status(
        &mut self,
        order: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE shop.orders SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(order)
                .bind(status)
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_transaction_id(
        &mut self,
        order: OrderId,
        transaction_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.orders
            SET transaction_id = $2, updated_at = NOW()
            WHERE id = $1 AND transaction_id IS NULL
            ",
        )
        .bind(order)
        .bind(transaction_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM shop.orders WHERE id = $1)",
            )
            .bind(order)
            .fetch_one(&mut *self.tx)
            .await?;
            return Err(if exists {
                RepositoryError::Conflict(format!("order {order} already has a transaction"))
            } else {
                RepositoryError::NotFound
            });
        }
        Ok(())
    }

    async fn orders_for_caller(
        &mut self,
        caller: CallerId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM shop.orders
            WHERE caller_id = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(caller)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn list_orders(
        &mut self,
        filter: &OrderFilter,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM shop.orders
            WHERE ($1::shop.order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.offset())
        .fetch_all(&mut *self.tx)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*)
            FROM shop.orders
            WHERE ($1::shop.order_status IS NULL OR status = $1)
            ",
        )
        .bind(filter.status)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok((rows.into_iter().map(Order::from).collect(), total))
    }
}
