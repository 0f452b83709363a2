//! Payment outbox.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cartwright_core::{OrderId, OutboxId};

use super::PgTransaction;
use crate::db::{OutboxOps, RepositoryError};
use crate::models::{OutboxKind, OutboxMessage};

const OUTBOX_COLUMNS: &str = r"
    id, order_id, kind, payload, attempts, last_error, claimed_until,
    dispatched_at, superseded_at, created_at
";

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: i32,
    order_id: i32,
    kind: OutboxKind,
    payload: serde_json::Value,
    attempts: i32,
    last_error: Option<String>,
    claimed_until: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
    superseded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: OutboxId::new(row.id),
            order_id: OrderId::new(row.order_id),
            kind: row.kind,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            claimed_until: row.claimed_until,
            dispatched_at: row.dispatched_at,
            superseded_at: row.superseded_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl OutboxOps for PgTransaction {
    async fn enqueue_outbox(
        &mut self,
        order: OrderId,
        kind: OutboxKind,
        payload: serde_json::Value,
    ) -> Result<OutboxId, RepositoryError> {
        let id = sqlx::query_scalar::<_, OutboxId>(
            r"
            INSERT INTO shop.payment_outbox (order_id, kind, payload)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(order)
        .bind(kind)
        .bind(payload)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn pending_outbox(&mut self, limit: i64) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let rows = sqlx::query_as::<_, OutboxRow>(&format!(
            r"
            SELECT {OUTBOX_COLUMNS}
            FROM shop.payment_outbox
            WHERE dispatched_at IS NULL AND superseded_at IS NULL AND attempts < $1
            ORDER BY id
            LIMIT $2
            "
        ))
        .bind(OutboxMessage::MAX_ATTEMPTS)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(OutboxMessage::from).collect())
    }

    async fn outbox_message(
        &mut self,
        id: OutboxId,
    ) -> Result<Option<OutboxMessage>, RepositoryError> {
        let row = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM shop.payment_outbox WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(OutboxMessage::from))
    }

    async fn claim_outbox(
        &mut self,
        id: OutboxId,
        until: DateTime<Utc>,
    ) -> Result<Option<OutboxMessage>, RepositoryError> {
        let row = sqlx::query_as::<_, OutboxRow>(&format!(
            r"
            UPDATE shop.payment_outbox
            SET claimed_until = $2
            WHERE id = $1
              AND dispatched_at IS NULL
              AND superseded_at IS NULL
              AND (claimed_until IS NULL OR claimed_until <= NOW())
            RETURNING {OUTBOX_COLUMNS}
            "
        ))
        .bind(id)
        .bind(until)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(OutboxMessage::from))
    }

    async fn supersede_outbox(
        &mut self,
        order: OrderId,
        kind: OutboxKind,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.payment_outbox
            SET superseded_at = NOW()
            WHERE order_id = $1 AND kind = $2
              AND dispatched_at IS NULL AND superseded_at IS NULL
            ",
        )
        .bind(order)
        .bind(kind)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_outbox_dispatched(&mut self, id: OutboxId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.payment_outbox
            SET dispatched_at = NOW(), attempts = attempts + 1, last_error = NULL,
                claimed_until = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn record_outbox_failure(
        &mut self,
        id: OutboxId,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.payment_outbox
            SET attempts = attempts + 1, last_error = $2, claimed_until = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
