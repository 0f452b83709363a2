//! Payment provider notifications over HTTP.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::Value;

use cartwright_core::{ProductId, StockKey};
use cartwright_integration_tests::TestContext;

/// Place an order for two of five units and return
/// `(product, number, transaction id)`.
async fn initiated_order(ctx: &TestContext) -> (ProductId, String, String) {
    let tee = ctx.product("Tee", 1_000, 5).await;
    ctx.add_to_cart(1, tee, None, 2).await;
    let receipt: Value = ctx.checkout(1).await.json().await.unwrap();
    (
        tee,
        receipt["order"]["number"].as_str().unwrap().to_owned(),
        receipt["payment"]["transaction_id"]
            .as_str()
            .unwrap()
            .to_owned(),
    )
}

#[tokio::test]
async fn test_success_notification_is_idempotent() {
    let ctx = TestContext::start().await;
    let (tee, number, transaction_id) = initiated_order(&ctx).await;

    let first = ctx.webhook(&number, &transaction_id, "SUCCESS").await;
    assert_eq!(first.status(), StatusCode::OK);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["result"], "applied");
    assert_eq!(first["status"], "paid");

    let second: Value = ctx
        .webhook(&number, &transaction_id, "SUCCESS")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["result"], "unchanged");
    assert_eq!(second["status"], "paid");
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(3));
}

#[tokio::test]
async fn test_failure_notification_cancels_and_releases() {
    let ctx = TestContext::start().await;
    let (product, number, transaction_id) = initiated_order(&ctx).await;
    let tee = StockKey::product(product);
    assert_eq!(ctx.store.stock(tee).await, Some(3));

    let response: Value = ctx
        .webhook(&number, &transaction_id, "FAILED")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(response["status"], "cancelled");
    assert_eq!(ctx.store.stock(tee).await, Some(5));

    // A late success for a cancelled order reactivates it if stock allows
    let response: Value = ctx
        .webhook(&number, &transaction_id, "SUCCESS")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(response["status"], "paid");
    assert_eq!(ctx.store.stock(tee).await, Some(3));
}

#[tokio::test]
async fn test_unmatched_notifications() {
    let ctx = TestContext::start().await;
    let (_, number, _) = initiated_order(&ctx).await;

    let response = ctx.webhook(&number, "txn-forged", "SUCCESS").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx.webhook("ORD-0-0", "txn-1", "SUCCESS").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx.webhook(&number, "", "SUCCESS").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notification_ahead_of_stored_transaction_is_retryable() {
    let ctx = TestContext::start().await;
    let tee = ctx.product("Tee", 1_000, 5).await;
    ctx.add_to_cart(1, tee, None, 1).await;
    ctx.provider.set_failing(true);
    let receipt: Value = ctx.checkout(1).await.json().await.unwrap();
    let number = receipt["order"]["number"].as_str().unwrap();

    let response = ctx.webhook(number, "txn-1", "SUCCESS").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(4));
}

#[tokio::test]
async fn test_in_progress_status_is_ignored() {
    let ctx = TestContext::start().await;
    let (_, number, transaction_id) = initiated_order(&ctx).await;

    let response: Value = ctx
        .webhook(&number, &transaction_id, "PROCESSING")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(response["result"], "ignored");
}
