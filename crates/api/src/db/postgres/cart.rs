//! Carts and cart items.

use async_trait::async_trait;
use rust_decimal::Decimal;

use cartwright_core::{CallerId, CartId, CartItemId, Money, ProductId, SizeId, StockKey};

use super::PgTransaction;
use crate::db::{CartOps, RepositoryError};
use crate::models::{CartItemRef, CartLine};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: i32,
    product_id: i32,
    size_id: Option<i32>,
    quantity: i32,
    product_name: String,
    size_name: Option<String>,
    unit_price: Decimal,
    available: i32,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        Self {
            item_id: CartItemId::new(row.id),
            key: stock_key(row.product_id, row.size_id),
            quantity: row.quantity,
            product_name: row.product_name,
            size_name: row.size_name,
            unit_price: Money::new(row.unit_price),
            available: row.available,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    id: i32,
    cart_id: i32,
    product_id: i32,
    size_id: Option<i32>,
    quantity: i32,
}

impl From<CartItemRow> for CartItemRef {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: CartItemId::new(row.id),
            cart_id: CartId::new(row.cart_id),
            key: stock_key(row.product_id, row.size_id),
            quantity: row.quantity,
        }
    }
}

fn stock_key(product_id: i32, size_id: Option<i32>) -> StockKey {
    StockKey {
        product_id: ProductId::new(product_id),
        size_id: size_id.map(SizeId::new),
    }
}

// =============================================================================
// Queries
// =============================================================================

#[async_trait]
impl CartOps for PgTransaction {
    async fn find_cart(
        &mut self,
        caller: CallerId,
        lock: bool,
    ) -> Result<Option<CartId>, RepositoryError> {
        let sql = if lock {
            "SELECT id FROM shop.cart WHERE caller_id = $1 FOR UPDATE"
        } else {
            "SELECT id FROM shop.cart WHERE caller_id = $1"
        };
        let id = sqlx::query_scalar::<_, CartId>(sql)
            .bind(caller)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn create_cart(&mut self, caller: CallerId) -> Result<CartId, RepositoryError> {
        let id = sqlx::query_scalar::<_, CartId>(
            r"
            INSERT INTO shop.cart (caller_id)
            VALUES ($1)
            ON CONFLICT (caller_id) DO UPDATE SET updated_at = NOW()
            RETURNING id
            ",
        )
        .bind(caller)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn cart_lines(&mut self, cart: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT
                ci.id,
                ci.product_id,
                ci.size_id,
                ci.quantity,
                p.name AS product_name,
                s.name AS size_name,
                p.price AS unit_price,
                CASE
                    WHEN ci.size_id IS NULL THEN p.stock
                    ELSE COALESCE(ps.stock, 0)
                END AS available
            FROM shop.cart_item ci
            JOIN catalog.product p ON p.id = ci.product_id
            LEFT JOIN catalog.size s ON s.id = ci.size_id
            LEFT JOIN catalog.product_size ps
                ON ps.product_id = ci.product_id AND ps.size_id = ci.size_id
            WHERE ci.cart_id = $1
            ORDER BY ci.product_id, ci.size_id NULLS FIRST
            ",
        )
        .bind(cart)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(CartLine::from).collect())
    }

    async fn find_cart_item(
        &mut self,
        cart: CartId,
        key: StockKey,
    ) -> Result<Option<CartItemRef>, RepositoryError> {
        let row = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT id, cart_id, product_id, size_id, quantity
            FROM shop.cart_item
            WHERE cart_id = $1 AND product_id = $2 AND size_id IS NOT DISTINCT FROM $3
            ",
        )
        .bind(cart)
        .bind(key.product_id)
        .bind(key.size_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(CartItemRef::from))
    }

    async fn owned_cart_item(
        &mut self,
        caller: CallerId,
        item: CartItemId,
    ) -> Result<Option<CartItemRef>, RepositoryError> {
        let row = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.size_id, ci.quantity
            FROM shop.cart_item ci
            JOIN shop.cart c ON c.id = ci.cart_id
            WHERE ci.id = $1 AND c.caller_id = $2
            FOR UPDATE OF ci
            ",
        )
        .bind(item)
        .bind(caller)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(CartItemRef::from))
    }

    async fn insert_cart_item(
        &mut self,
        cart: CartId,
        key: StockKey,
        quantity: i32,
    ) -> Result<CartItemId, RepositoryError> {
        sqlx::query_scalar::<_, CartItemId>(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, size_id, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(cart)
        .bind(key.product_id)
        .bind(key.size_id)
        .bind(quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::unique_as_conflict(e, "cart line"))
    }

    async fn set_cart_item_quantity(
        &mut self,
        item: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.cart_item SET quantity = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(item)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_cart_item(&mut self, item: CartItemId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE id = $1")
            .bind(item)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
            .bind(cart)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}
