//! Payment outbox dispatch.
//!
//! A dispatcher first claims a message for a short lease in its own
//! transaction, calls the provider with no transaction open, and records the
//! result in a second transaction. While the lease holds, other dispatchers
//! skip the message. Delivery is at-least-once: a crash after the provider
//! call leaves the message pending and it is sent again once the lease runs
//! out.
//!
//! A payment request whose order was cancelled before it went out is
//! superseded instead of sent. If the cancellation lands while the request
//! is in flight, the new provider transaction is cancelled straight away.

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use cartwright_core::{OrderStatus, OutboxId};

use super::{CancelPaymentRequest, PaymentError, PaymentGateway, PaymentRequest};
use crate::db::{RepositoryError, Store};
use crate::models::{Order, OutboxKind, OutboxMessage};

/// How long a claimed message is reserved for one dispatcher.
const CLAIM_LEASE_SECS: i64 = 60;

/// Errors that stop a message from being dispatched at all.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox message {0} not found")]
    NotFound(OutboxId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What happened to one outbox message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    PaymentCreated { transaction_id: String },
    PaymentCancelled,
    /// The provider opened a payment for an order cancelled in the meantime;
    /// `cancel` is the queued cancellation for it.
    PaymentDiscarded {
        transaction_id: String,
        cancel: OutboxId,
    },
    /// Another dispatcher already delivered the message.
    AlreadyDispatched,
    /// Another dispatcher holds the lease.
    InFlight,
    /// The order no longer needs the call.
    Superseded,
    /// The provider call failed; the message stays pending.
    Failed { error: String },
}

enum Delivery {
    Created(String),
    Cancelled,
}

enum Claim {
    Taken(OutboxMessage),
    Skipped(DispatchOutcome),
}

/// Whether a payment may still be opened for `order`.
fn wants_payment(order: Option<&Order>) -> bool {
    order.is_some_and(|order| {
        order.status != OrderStatus::Cancelled && order.transaction_id.is_none()
    })
}

/// Sends queued provider calls.
pub struct OutboxDispatcher<'a> {
    store: &'a dyn Store,
    gateway: &'a dyn PaymentGateway,
}

impl<'a> OutboxDispatcher<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, gateway: &'a dyn PaymentGateway) -> Self {
        Self { store, gateway }
    }

    /// Send one message and record the result.
    ///
    /// Provider failures are recorded on the message and reported as
    /// [`DispatchOutcome::Failed`], not as errors. A discarded payment's
    /// cancellation is sent before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist or the store fails.
    pub async fn dispatch(&self, id: OutboxId) -> Result<DispatchOutcome, OutboxError> {
        let outcome = self.send(id).await?;
        if let DispatchOutcome::PaymentDiscarded { cancel, .. } = &outcome {
            match self.send(*cancel).await {
                Ok(DispatchOutcome::PaymentCancelled) => {}
                Ok(other) => {
                    warn!(outbox = %cancel, outcome = ?other, "Discarded payment left in outbox");
                }
                Err(e) => {
                    warn!(outbox = %cancel, error = %e, "Failed to cancel discarded payment");
                }
            }
        }
        Ok(outcome)
    }

    #[instrument(skip(self), fields(outbox = %id))]
    async fn send(&self, id: OutboxId) -> Result<DispatchOutcome, OutboxError> {
        let message = match self.claim(id).await? {
            Claim::Taken(message) => message,
            Claim::Skipped(outcome) => return Ok(outcome),
        };

        let delivery = self.deliver(&message).await;

        let mut tx = self.store.begin().await?;
        let outcome = match delivery {
            Ok(Delivery::Created(transaction_id)) => {
                let order = tx.order_by_id(message.order_id, true).await?;
                tx.mark_outbox_dispatched(id).await?;
                if wants_payment(order.as_ref()) {
                    tx.set_transaction_id(message.order_id, &transaction_id)
                        .await?;
                    info!(order = %message.order_id, %transaction_id, "Payment created");
                    DispatchOutcome::PaymentCreated { transaction_id }
                } else {
                    let payload = serde_json::to_value(CancelPaymentRequest {
                        transaction_id: transaction_id.clone(),
                    })
                    .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
                    let cancel = tx
                        .enqueue_outbox(message.order_id, OutboxKind::CancelPayment, payload)
                        .await?;
                    warn!(
                        order = %message.order_id,
                        %transaction_id,
                        "Payment created after its order moved on, cancelling it"
                    );
                    DispatchOutcome::PaymentDiscarded {
                        transaction_id,
                        cancel,
                    }
                }
            }
            Ok(Delivery::Cancelled) => {
                tx.mark_outbox_dispatched(id).await?;
                info!(order = %message.order_id, "Payment cancelled");
                DispatchOutcome::PaymentCancelled
            }
            Err(e) => {
                let error = e.to_string();
                tx.record_outbox_failure(id, &error).await?;
                warn!(
                    order = %message.order_id,
                    kind = ?message.kind,
                    attempts = message.attempts + 1,
                    %error,
                    "Payment provider call failed"
                );
                DispatchOutcome::Failed { error }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    /// Take the lease on a message, or say why it is not ours to send.
    async fn claim(&self, id: OutboxId) -> Result<Claim, OutboxError> {
        let mut tx = self.store.begin().await?;
        let until = Utc::now() + Duration::seconds(CLAIM_LEASE_SECS);
        let Some(message) = tx.claim_outbox(id, until).await? else {
            let message = tx
                .outbox_message(id)
                .await?
                .ok_or(OutboxError::NotFound(id))?;
            let outcome = if message.is_dispatched() {
                DispatchOutcome::AlreadyDispatched
            } else if message.is_superseded() {
                DispatchOutcome::Superseded
            } else {
                DispatchOutcome::InFlight
            };
            return Ok(Claim::Skipped(outcome));
        };

        if message.kind == OutboxKind::CreatePayment {
            let order = tx.order_by_id(message.order_id, false).await?;
            if !wants_payment(order.as_ref()) {
                tx.supersede_outbox(message.order_id, OutboxKind::CreatePayment)
                    .await?;
                tx.commit().await?;
                info!(order = %message.order_id, "Payment request no longer needed");
                return Ok(Claim::Skipped(DispatchOutcome::Superseded));
            }
        }

        tx.commit().await?;
        Ok(Claim::Taken(message))
    }

    /// Dispatch up to `limit` pending messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; provider failures are reported
    /// per message.
    pub async fn dispatch_pending(
        &self,
        limit: i64,
    ) -> Result<Vec<(OutboxId, DispatchOutcome)>, OutboxError> {
        let pending = {
            let mut tx = self.store.begin().await?;
            tx.pending_outbox(limit).await?
        };

        let mut outcomes = Vec::with_capacity(pending.len());
        for message in pending {
            let outcome = self.dispatch(message.id).await?;
            outcomes.push((message.id, outcome));
        }
        Ok(outcomes)
    }

    async fn deliver(&self, message: &OutboxMessage) -> Result<Delivery, PaymentError> {
        match message.kind {
            OutboxKind::CreatePayment => {
                let request: PaymentRequest = serde_json::from_value(message.payload.clone())
                    .map_err(|e| PaymentError::Parse(format!("outbox payload: {e}")))?;
                let transaction_id = self.gateway.create_payment(&request).await?;
                Ok(Delivery::Created(transaction_id))
            }
            OutboxKind::CancelPayment => {
                let request: CancelPaymentRequest =
                    serde_json::from_value(message.payload.clone())
                        .map_err(|e| PaymentError::Parse(format!("outbox payload: {e}")))?;
                self.gateway
                    .cancel_payment(&request.transaction_id)
                    .await?;
                Ok(Delivery::Cancelled)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cartwright_core::{CallerId, OrderId, OrderNumber, ProviderStatus, ShippingAddress};
    use serde_json::json;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::NewOrder;
    use crate::services::OrderService;
    use crate::services::payments::StubGateway;

    const CALLER: CallerId = CallerId::new(1);

    async fn enqueue(
        store: &MemoryStore,
        order: OrderId,
        kind: OutboxKind,
        payload: serde_json::Value,
    ) -> OutboxId {
        let mut tx = store.begin().await.unwrap();
        let id = tx.enqueue_outbox(order, kind, payload).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    async fn order(store: &MemoryStore) -> Order {
        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(&NewOrder {
                number: OrderNumber::generate(CALLER, Utc::now()),
                caller_id: CALLER,
                shipping_address: ShippingAddress {
                    recipient_name: "Alice".to_owned(),
                    phone: "1".to_owned(),
                    address_line1: "1 Main St".to_owned(),
                    address_line2: None,
                    city: "Bangkok".to_owned(),
                    state: "BKK".to_owned(),
                    postal_code: "10110".to_owned(),
                    country: "TH".to_owned(),
                },
                lines: Vec::new(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        order
    }

    fn create_payload() -> serde_json::Value {
        json!({
            "firstname": "Alice", "lastname": "", "email": "", "phone": "1",
            "amount": 30.0, "description": "Tee x3", "address": "1 Main St, Bangkok 10110",
            "message": "Order: ORD-1-1", "feeType": "include", "orderId": "ORD-1-1",
            "paymentType": "QRNONE", "agreement": 1
        })
    }

    #[tokio::test]
    async fn test_create_sets_transaction_id_once() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let order = order(&store).await;
        let id = enqueue(&store, order.id, OutboxKind::CreatePayment, create_payload()).await;
        let dispatcher = OutboxDispatcher::new(&store, &gateway);

        assert_eq!(
            dispatcher.dispatch(id).await.unwrap(),
            DispatchOutcome::PaymentCreated {
                transaction_id: "txn-1".to_owned()
            }
        );
        assert_eq!(
            dispatcher.dispatch(id).await.unwrap(),
            DispatchOutcome::AlreadyDispatched
        );
        assert_eq!(gateway.created().len(), 1);

        let mut tx = store.begin().await.unwrap();
        let stored = tx.order_by_number(&order.number, false).await.unwrap().unwrap();
        assert_eq!(stored.transaction_id.as_deref(), Some("txn-1"));
        let message = tx.outbox_message(id).await.unwrap().unwrap();
        assert_eq!(message.attempts, 1);
        assert!(message.claimed_until.is_none());
        assert!(matches!(
            tx.set_transaction_id(order.id, "txn-2").await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_overlapping_dispatches_send_once() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let order = order(&store).await;
        let id = enqueue(&store, order.id, OutboxKind::CreatePayment, create_payload()).await;
        let dispatcher = OutboxDispatcher::new(&store, &gateway);

        let (first, second) = tokio::join!(dispatcher.dispatch(id), dispatcher.dispatch(id));
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|outcome| matches!(outcome, DispatchOutcome::InFlight));
        assert_eq!(
            outcomes,
            vec![
                DispatchOutcome::PaymentCreated {
                    transaction_id: "txn-1".to_owned()
                },
                DispatchOutcome::InFlight,
            ]
        );
        assert_eq!(gateway.created().len(), 1);

        let mut tx = store.begin().await.unwrap();
        let stored = tx.order_by_id(order.id, false).await.unwrap().unwrap();
        assert_eq!(stored.transaction_id.as_deref(), Some("txn-1"));
    }

    #[tokio::test]
    async fn test_lease_blocks_other_dispatchers_until_released() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let order_id = order(&store).await.id;
        let id = enqueue(&store, order_id, OutboxKind::CreatePayment, create_payload()).await;
        {
            let mut tx = store.begin().await.unwrap();
            let until = Utc::now() + Duration::seconds(CLAIM_LEASE_SECS);
            assert!(tx.claim_outbox(id, until).await.unwrap().is_some());
            assert!(tx.claim_outbox(id, until).await.unwrap().is_none());
            tx.commit().await.unwrap();
        }

        let outcomes = OutboxDispatcher::new(&store, &gateway)
            .dispatch_pending(10)
            .await
            .unwrap();
        assert_eq!(outcomes, vec![(id, DispatchOutcome::InFlight)]);
        assert!(gateway.created().is_empty());

        let mut leased = store.outbox().await.remove(0);
        assert!(!leased.is_claimable(Utc::now()));
        leased.claimed_until = Some(Utc::now() - Duration::seconds(1));
        assert!(leased.is_claimable(Utc::now()));

        {
            let mut tx = store.begin().await.unwrap();
            tx.record_outbox_failure(id, "provider timed out")
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }
        assert!(matches!(
            OutboxDispatcher::new(&store, &gateway).dispatch(id).await.unwrap(),
            DispatchOutcome::PaymentCreated { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_order_never_gets_a_payment() {
        let store = MemoryStore::new();
        let order = order(&store).await;
        let id = enqueue(&store, order.id, OutboxKind::CreatePayment, create_payload()).await;

        let failing = StubGateway::failing();
        assert!(matches!(
            OutboxDispatcher::new(&store, &failing).dispatch(id).await.unwrap(),
            DispatchOutcome::Failed { .. }
        ));
        OrderService::new(&store, &failing)
            .cancel(CALLER, &order.number)
            .await
            .unwrap();

        let gateway = StubGateway::default();
        let dispatcher = OutboxDispatcher::new(&store, &gateway);
        assert!(dispatcher.dispatch_pending(10).await.unwrap().is_empty());
        assert_eq!(
            dispatcher.dispatch(id).await.unwrap(),
            DispatchOutcome::Superseded
        );
        assert!(gateway.created().is_empty());

        let mut tx = store.begin().await.unwrap();
        let stored = tx.order_by_id(order.id, false).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert!(stored.transaction_id.is_none());
        assert!(tx.outbox_message(id).await.unwrap().unwrap().is_superseded());
    }

    #[tokio::test]
    async fn test_stale_request_is_superseded_at_claim() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let order = order(&store).await;
        let id = enqueue(&store, order.id, OutboxKind::CreatePayment, create_payload()).await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.set_order_status(order.id, OrderStatus::Cancelled)
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }

        assert_eq!(
            OutboxDispatcher::new(&store, &gateway)
                .dispatch(id)
                .await
                .unwrap(),
            DispatchOutcome::Superseded
        );
        assert!(gateway.created().is_empty());
    }

    /// Gateway whose payment creation races with the customer cancelling.
    struct CancelDuringCreate {
        store: MemoryStore,
        number: OrderNumber,
        cancelled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PaymentGateway for CancelDuringCreate {
        async fn create_payment(&self, _request: &PaymentRequest) -> Result<String, PaymentError> {
            OrderService::new(&self.store, &StubGateway::default())
                .cancel(CALLER, &self.number)
                .await
                .unwrap();
            Ok("txn-late".to_owned())
        }

        async fn query_status(&self, _transaction_id: &str) -> Result<ProviderStatus, PaymentError> {
            Ok(ProviderStatus::Other("PENDING".to_owned()))
        }

        async fn cancel_payment(&self, transaction_id: &str) -> Result<(), PaymentError> {
            self.cancelled
                .lock()
                .unwrap()
                .push(transaction_id.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_payment_created_after_cancel_is_cancelled() {
        let store = MemoryStore::new();
        let order = order(&store).await;
        let id = enqueue(&store, order.id, OutboxKind::CreatePayment, create_payload()).await;
        let gateway = CancelDuringCreate {
            store: store.clone(),
            number: order.number.clone(),
            cancelled: Mutex::new(Vec::new()),
        };

        let outcome = OutboxDispatcher::new(&store, &gateway)
            .dispatch(id)
            .await
            .unwrap();
        let DispatchOutcome::PaymentDiscarded {
            transaction_id,
            cancel,
        } = outcome
        else {
            panic!("expected a discarded payment, got {outcome:?}");
        };
        assert_eq!(transaction_id, "txn-late");
        assert_eq!(*gateway.cancelled.lock().unwrap(), vec!["txn-late".to_owned()]);

        let mut tx = store.begin().await.unwrap();
        let stored = tx.order_by_id(order.id, false).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert!(stored.transaction_id.is_none());
        assert!(tx.outbox_message(cancel).await.unwrap().unwrap().is_dispatched());
    }

    #[tokio::test]
    async fn test_failures_are_recorded_and_retried() {
        let store = MemoryStore::new();
        let order_id = order(&store).await.id;
        let id = enqueue(&store, order_id, OutboxKind::CreatePayment, create_payload()).await;

        let failing = StubGateway::failing();
        let outcome = OutboxDispatcher::new(&store, &failing)
            .dispatch(id)
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));

        let pending = store.outbox().await;
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.is_some());
        assert!(!pending[0].is_dispatched());

        let gateway = StubGateway::default();
        let outcomes = OutboxDispatcher::new(&store, &gateway)
            .dispatch_pending(10)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, DispatchOutcome::PaymentCreated { .. }));
        assert!(store.outbox().await[0].last_error.is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_without_calling_provider() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        let order_id = order(&store).await.id;
        let id = enqueue(&store, order_id, OutboxKind::CancelPayment, json!({})).await;

        let outcome = OutboxDispatcher::new(&store, &gateway)
            .dispatch(id)
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
        assert!(gateway.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message() {
        let store = MemoryStore::new();
        let gateway = StubGateway::default();
        assert!(matches!(
            OutboxDispatcher::new(&store, &gateway)
                .dispatch(OutboxId::new(404))
                .await,
            Err(OutboxError::NotFound(_))
        ));
    }
}
