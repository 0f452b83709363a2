//! Order lifecycle over HTTP: admin transitions, reactivation, variants.

#![allow(clippy::unwrap_used)]

use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use cartwright_core::{Money, StockKey};
use cartwright_integration_tests::TestContext;

async fn place_order(ctx: &TestContext, caller: i32) -> Value {
    let response = ctx.checkout(caller).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.unwrap()
}

async fn set_status(ctx: &TestContext, number: &str, status: &str) -> reqwest::Response {
    ctx.admin(Method::PUT, &format!("/admin/orders/{number}/status"))
        .json(&json!({ "status": status }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cancel_and_reactivate_paid_order() {
    let ctx = TestContext::start().await;
    let tee = ctx.product("Tee", 1_000, 5).await;
    ctx.add_to_cart(1, tee, None, 2).await;
    let receipt = place_order(&ctx, 1).await;
    let number = receipt["order"]["number"].as_str().unwrap();

    assert_eq!(set_status(&ctx, number, "paid").await.status(), StatusCode::OK);
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(3));

    let cancelled: Value = set_status(&ctx, number, "cancelled").await.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(5));

    let reactivated: Value = set_status(&ctx, number, "paid").await.json().await.unwrap();
    assert_eq!(reactivated["status"], "paid");
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(3));
}

#[tokio::test]
async fn test_reactivation_without_stock_changes_nothing() {
    let ctx = TestContext::start().await;
    let tee = ctx.product("Tee", 1_000, 5).await;
    ctx.add_to_cart(1, tee, None, 2).await;
    let receipt = place_order(&ctx, 1).await;
    let number = receipt["order"]["number"].as_str().unwrap();

    set_status(&ctx, number, "cancelled").await;
    ctx.store.set_stock(StockKey::product(tee), 1).await;

    let response = set_status(&ctx, number, "paid").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(1));

    let detail: Value = ctx
        .customer(Method::GET, &format!("/orders/{number}"), 1)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["status"], "cancelled");
}

#[tokio::test]
async fn test_forward_only_lifecycle() {
    let ctx = TestContext::start().await;
    let tee = ctx.product("Tee", 1_000, 5).await;
    ctx.add_to_cart(1, tee, None, 1).await;
    let receipt = place_order(&ctx, 1).await;
    let number = receipt["order"]["number"].as_str().unwrap();

    assert_eq!(set_status(&ctx, number, "shipped").await.status(), StatusCode::CONFLICT);
    for status in ["paid", "shipped", "delivered"] {
        assert_eq!(set_status(&ctx, number, status).await.status(), StatusCode::OK);
    }
    assert_eq!(set_status(&ctx, number, "cancelled").await.status(), StatusCode::CONFLICT);
    assert_eq!(set_status(&ctx, number, "pending").await.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(4));
}

#[tokio::test]
async fn test_customer_cancel_only_while_pending() {
    let ctx = TestContext::start().await;
    let tee = ctx.product("Tee", 1_000, 5).await;
    ctx.add_to_cart(1, tee, None, 1).await;
    let receipt = place_order(&ctx, 1).await;
    let number = receipt["order"]["number"].as_str().unwrap();
    let cancel = format!("/orders/{number}/cancel");

    let response = ctx.customer(Method::POST, &cancel, 2).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    set_status(&ctx, number, "paid").await;
    let response = ctx.customer(Method::POST, &cancel, 1).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.store.stock(StockKey::product(tee)).await, Some(4));
}

#[tokio::test]
async fn test_variant_stock_keeps_product_aggregate() {
    let ctx = TestContext::start().await;
    let (hoodie, sizes) = ctx
        .store
        .add_sized_product("Hoodie", Money::from_minor(120_000), &[("S", 2), ("M", 3)])
        .await;
    let medium = StockKey::variant(hoodie, sizes[1]);
    assert_eq!(ctx.store.product_stock(hoodie).await, Some(5));

    // A sized product has no product-level counter to buy from
    let response = ctx.add_to_cart(1, hoodie, None, 1).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx
        .add_to_cart(1, hoodie, Some(sizes[1].as_i32()), 2)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cart: Value = ctx
        .customer(Method::GET, "/cart", 1)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cart["items"][0]["size_name"], "M");

    let receipt = place_order(&ctx, 1).await;
    assert_eq!(ctx.store.stock(medium).await, Some(1));
    assert_eq!(ctx.store.product_stock(hoodie).await, Some(3));

    let number = receipt["order"]["number"].as_str().unwrap();
    set_status(&ctx, number, "cancelled").await;
    assert_eq!(ctx.store.stock(medium).await, Some(3));
    assert_eq!(ctx.store.product_stock(hoodie).await, Some(5));
}

#[tokio::test]
async fn test_admin_listing_pages_and_filters() {
    let ctx = TestContext::start().await;
    let tee = ctx.product("Tee", 1_000, 10).await;
    let mut numbers = Vec::new();
    for caller in 1..=3 {
        ctx.add_to_cart(caller, tee, None, 1).await;
        let receipt = place_order(&ctx, caller).await;
        numbers.push(receipt["order"]["number"].as_str().unwrap().to_owned());
    }
    set_status(&ctx, &numbers[0], "paid").await;

    let page: Value = ctx
        .admin(Method::GET, "/admin/orders?page=1&limit=2")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["orders"].as_array().unwrap().len(), 2);

    let paid: Value = ctx
        .admin(Method::GET, "/admin/orders?status=paid")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paid["total"], 1);
    assert_eq!(paid["orders"][0]["number"], numbers[0].as_str());

    let own: Value = ctx
        .customer(Method::GET, "/orders", 2)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(own.as_array().unwrap().len(), 1);
}
