//! Stock counters in the `catalog` schema.
//!
//! Products without variants carry their own counter in `catalog.product`.
//! Products with variants are counted per `catalog.product_size` row and the
//! product column holds the sum.

use async_trait::async_trait;

use cartwright_core::{ProductId, StockKey};

use super::PgTransaction;
use crate::db::{RepositoryError, StockChange, StockOps};

const PRODUCT_LEVEL: &str = r"
    SELECT p.stock
    FROM catalog.product p
    WHERE p.id = $1
      AND NOT EXISTS (SELECT 1 FROM catalog.product_size ps WHERE ps.product_id = p.id)
";

const VARIANT_LEVEL: &str = r"
    SELECT stock
    FROM catalog.product_size
    WHERE product_id = $1 AND size_id = $2
";

impl PgTransaction {
    async fn level(&mut self, key: StockKey, lock: bool) -> Result<Option<i32>, RepositoryError> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let level = match key.size_id {
            Some(size_id) => {
                sqlx::query_scalar::<_, i32>(&format!("{VARIANT_LEVEL}{suffix}"))
                    .bind(key.product_id)
                    .bind(size_id)
                    .fetch_optional(&mut *self.tx)
                    .await?
            }
            None => {
                sqlx::query_scalar::<_, i32>(&format!("{PRODUCT_LEVEL}{suffix}"))
                    .bind(key.product_id)
                    .fetch_optional(&mut *self.tx)
                    .await?
            }
        };
        Ok(level)
    }

    async fn adjust(&mut self, key: StockKey, delta: i32) -> Result<Option<i32>, RepositoryError> {
        // A negative delta only applies when enough stock is left.
        let level = match key.size_id {
            Some(size_id) => {
                sqlx::query_scalar::<_, i32>(
                    r"
                    UPDATE catalog.product_size
                    SET stock = stock + $3
                    WHERE product_id = $1 AND size_id = $2 AND stock + $3 >= 0
                    RETURNING stock
                    ",
                )
                .bind(key.product_id)
                .bind(size_id)
                .bind(delta)
                .fetch_optional(&mut *self.tx)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i32>(
                    r"
                    UPDATE catalog.product p
                    SET stock = stock + $2, updated_at = NOW()
                    WHERE p.id = $1
                      AND p.stock + $2 >= 0
                      AND NOT EXISTS (SELECT 1 FROM catalog.product_size ps WHERE ps.product_id = p.id)
                    RETURNING p.stock
                    ",
                )
                .bind(key.product_id)
                .bind(delta)
                .fetch_optional(&mut *self.tx)
                .await?
            }
        };
        Ok(level)
    }
}

#[async_trait]
impl StockOps for PgTransaction {
    async fn lock_stock(&mut self, key: StockKey) -> Result<Option<i32>, RepositoryError> {
        self.level(key, true).await
    }

    async fn stock_level(&mut self, key: StockKey) -> Result<Option<i32>, RepositoryError> {
        self.level(key, false).await
    }

    async fn take_stock(
        &mut self,
        key: StockKey,
        quantity: i32,
    ) -> Result<StockChange, RepositoryError> {
        if let Some(remaining) = self.adjust(key, -quantity).await? {
            return Ok(StockChange::Applied { remaining });
        }
        Ok(match self.level(key, false).await? {
            Some(available) => StockChange::Insufficient { available },
            None => StockChange::Missing,
        })
    }

    async fn return_stock(
        &mut self,
        key: StockKey,
        quantity: i32,
    ) -> Result<Option<i32>, RepositoryError> {
        self.adjust(key, quantity).await
    }

    async fn sync_product_stock(&mut self, product_id: ProductId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE catalog.product p
            SET stock = (SELECT COALESCE(SUM(ps.stock), 0) FROM catalog.product_size ps WHERE ps.product_id = p.id),
                updated_at = NOW()
            WHERE p.id = $1
              AND EXISTS (SELECT 1 FROM catalog.product_size ps WHERE ps.product_id = p.id)
            ",
        )
        .bind(product_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
