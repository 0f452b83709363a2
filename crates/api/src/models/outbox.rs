//! Payment outbox messages.
//!
//! A message is written in the same transaction as the order change that
//! needs a provider call, then dispatched after commit. Undispatched messages
//! are picked up again by `cw-cli outbox dispatch`.
//!
//! A dispatcher claims a message for a short lease before calling the
//! provider, so overlapping dispatchers never send the same message twice
//! while the lease holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cartwright_core::{OrderId, OutboxId};

/// What the provider should be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "shop.outbox_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    CreatePayment,
    CancelPayment,
}

/// A queued provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: OutboxId,
    pub order_id: OrderId,
    pub kind: OutboxKind,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    /// The order change behind the message was undone before it was sent.
    pub superseded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Attempts after which a message is no longer picked up automatically.
    pub const MAX_ATTEMPTS: i32 = 10;

    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }

    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        self.superseded_at.is_some()
    }

    /// Whether a dispatcher may take the message at `now`.
    #[must_use]
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        !self.is_dispatched()
            && !self.is_superseded()
            && self.claimed_until.is_none_or(|until| until <= now)
    }
}
