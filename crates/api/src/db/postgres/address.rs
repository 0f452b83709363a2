//! Saved shipping addresses.

use async_trait::async_trait;

use cartwright_core::{AddressId, CallerId, ShippingAddress};

use super::PgTransaction;
use crate::db::{AddressOps, RepositoryError};

#[derive(Debug, sqlx::FromRow)]
struct AddressRow {
    recipient_name: String,
    phone: String,
    address_line1: String,
    address_line2: Option<String>,
    city: String,
    state: String,
    postal_code: String,
    country: String,
}

impl From<AddressRow> for ShippingAddress {
    fn from(row: AddressRow) -> Self {
        Self {
            recipient_name: row.recipient_name,
            phone: row.phone,
            address_line1: row.address_line1,
            address_line2: row.address_line2,
            city: row.city,
            state: row.state,
            postal_code: row.postal_code,
            country: row.country,
        }
    }
}

#[async_trait]
impl AddressOps for PgTransaction {
    async fn owned_address(
        &mut self,
        caller: CallerId,
        address: AddressId,
    ) -> Result<Option<ShippingAddress>, RepositoryError> {
        let row = sqlx::query_as::<_, AddressRow>(
            r"
            SELECT recipient_name, phone, address_line1, address_line2,
                   city, state, postal_code, country
            FROM shop.shipping_address
            WHERE id = $1 AND caller_id = $2
            ",
        )
        .bind(address)
        .bind(caller)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(ShippingAddress::from))
    }

    async fn clear_default_address(&mut self, caller: CallerId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE shop.shipping_address
            SET is_default = FALSE, updated_at = NOW()
            WHERE caller_id = $1 AND is_default
            ",
        )
        .bind(caller)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_address(
        &mut self,
        caller: CallerId,
        address: &ShippingAddress,
        is_default: bool,
    ) -> Result<AddressId, RepositoryError> {
        sqlx::query_scalar::<_, AddressId>(
            r"
            INSERT INTO shop.shipping_address (
                caller_id, recipient_name, phone, address_line1, address_line2,
                city, state, postal_code, country, is_default
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            ",
        )
        .bind(caller)
        .bind(&address.recipient_name)
        .bind(&address.phone)
        .bind(&address.address_line1)
        .bind(address.address_line2.as_deref())
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(is_default)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::unique_as_conflict(e, "default address"))
    }
}
