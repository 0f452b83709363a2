//! Services against the `PostgreSQL` store.
//!
//! These tests require a running `PostgreSQL` database reachable through
//! `DATABASE_URL`. Migrations are applied on connect. Every test seeds its
//! own products and uses fresh caller ids, so runs can share a database.
//!
//! Run with: `cargo test -p cartwright-integration-tests -- --ignored`

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicI32, Ordering};

use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::PgPool;

use cartwright_api::db::{PgStore, Store, create_pool};
use cartwright_api::models::{Caller, OutboxKind, QuantityMode};
use cartwright_api::services::payments::{DispatchOutcome, OutboxDispatcher};
use cartwright_api::services::{
    CartError, CartService, CheckoutError, CheckoutService, InventoryLedger, OrderError,
    OrderService, ShippingInput,
};
use cartwright_core::{CallerId, OrderStatus, ProductId, ShippingAddress, SizeId, StockKey};
use cartwright_integration_tests::start_provider;

static NEXT_CALLER: AtomicI32 = AtomicI32::new(1);

/// A caller id no earlier run has used.
fn fresh_caller() -> CallerId {
    let run = i32::try_from(chrono::Utc::now().timestamp() % 100_000).unwrap();
    CallerId::new(run * 10_000 + NEXT_CALLER.fetch_add(1, Ordering::SeqCst))
}

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/cartwright_test".to_owned());
    let pool = create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("../api/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    PgStore::new(pool)
}

async fn seed_product(pool: &PgPool, name: &str, stock: i32) -> ProductId {
    sqlx::query_scalar::<_, ProductId>(
        "INSERT INTO catalog.product (name, price, stock) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(Decimal::new(1_000, 2))
    .bind(stock)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_size(pool: &PgPool, product: ProductId, name: &str, stock: i32) -> SizeId {
    let size = sqlx::query_scalar::<_, SizeId>(
        r"
        INSERT INTO catalog.size (name) VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        ",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO catalog.product_size (product_id, size_id, stock) VALUES ($1, $2, $3)")
        .bind(product)
        .bind(size)
        .bind(stock)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        r"
        UPDATE catalog.product
        SET stock = (SELECT SUM(stock) FROM catalog.product_size WHERE product_id = $1)
        WHERE id = $1
        ",
    )
    .bind(product)
    .execute(pool)
    .await
    .unwrap();
    size
}

async fn product_stock(pool: &PgPool, product: ProductId) -> i32 {
    sqlx::query_scalar("SELECT stock FROM catalog.product WHERE id = $1")
        .bind(product)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn variant_stock(pool: &PgPool, product: ProductId, size: SizeId) -> i32 {
    sqlx::query_scalar(
        "SELECT stock FROM catalog.product_size WHERE product_id = $1 AND size_id = $2",
    )
    .bind(product)
    .bind(size)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn inline_address() -> ShippingInput {
    ShippingInput::Inline {
        address: ShippingAddress {
            recipient_name: "Somchai Jaidee".to_owned(),
            phone: "0812345678".to_owned(),
            address_line1: "99 Sukhumvit Rd".to_owned(),
            address_line2: None,
            city: "Bangkok".to_owned(),
            state: "BKK".to_owned(),
            postal_code: "10110".to_owned(),
            country: "TH".to_owned(),
        },
        is_default: false,
        save: false,
    }
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_last_unit_goes_to_exactly_one_checkout() {
    let store = connect().await;
    let (_provider, gateway) = start_provider().await;
    let product = seed_product(store.pool(), "Last Tee", 1).await;
    let key = StockKey::product(product);
    let (alice, bob) = (fresh_caller(), fresh_caller());

    let carts = CartService::new(&store);
    carts.upsert_item(alice, key, 1, QuantityMode::Add).await.unwrap();
    carts.upsert_item(bob, key, 1, QuantityMode::Add).await.unwrap();

    let checkout = CheckoutService::new(&store, &gateway);
    let (alice_caller, bob_caller) = (Caller::customer(alice), Caller::customer(bob));
    let (first, second) = tokio::join!(
        checkout.checkout(&alice_caller, inline_address()),
        checkout.checkout(&bob_caller, inline_address()),
    );

    let (placed, refused): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(Result::is_ok);
    assert_eq!(placed.len(), 1);
    assert!(matches!(
        refused[0],
        Err(CheckoutError::InsufficientStock {
            available: 0,
            requested: 1,
            ..
        })
    ));
    assert_eq!(product_stock(store.pool(), product).await, 0);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_variant_moves_keep_product_aggregate() {
    let store = connect().await;
    let product = seed_product(store.pool(), "Hoodie", 0).await;
    let small = seed_size(store.pool(), product, "S", 2).await;
    let medium = seed_size(store.pool(), product, "M", 3).await;
    assert_eq!(product_stock(store.pool(), product).await, 5);

    let ledger = InventoryLedger::new(&store);
    assert_eq!(
        ledger.reserve(StockKey::variant(product, medium), 2).await.unwrap(),
        1
    );
    assert_eq!(product_stock(store.pool(), product).await, 3);

    ledger.release(StockKey::variant(product, small), 1).await.unwrap();
    assert_eq!(variant_stock(store.pool(), product, small).await, 3);
    assert_eq!(product_stock(store.pool(), product).await, 4);

    assert!(ledger.reserve(StockKey::variant(product, small), 4).await.is_err());
    assert!(ledger.reserve(StockKey::product(product), 1).await.is_err());
    assert_eq!(product_stock(store.pool(), product).await, 4);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_reactivation_is_all_or_nothing() {
    let store = connect().await;
    let (_provider, gateway) = start_provider().await;
    let tee = seed_product(store.pool(), "Tee", 5).await;
    let cap = seed_product(store.pool(), "Cap", 5).await;
    let caller = fresh_caller();

    let carts = CartService::new(&store);
    carts
        .upsert_item(caller, StockKey::product(tee), 2, QuantityMode::Add)
        .await
        .unwrap();
    carts
        .upsert_item(caller, StockKey::product(cap), 4, QuantityMode::Add)
        .await
        .unwrap();
    let receipt = CheckoutService::new(&store, &gateway)
        .checkout(&Caller::customer(caller), inline_address())
        .await
        .unwrap();
    let number = receipt.order.number;

    let orders = OrderService::new(&store, &gateway);
    orders.update_status(&number, "paid").await.unwrap();
    orders.update_status(&number, "cancelled").await.unwrap();
    assert_eq!(product_stock(store.pool(), tee).await, 5);
    assert_eq!(product_stock(store.pool(), cap).await, 5);

    sqlx::query("UPDATE catalog.product SET stock = 3 WHERE id = $1")
        .bind(cap)
        .execute(store.pool())
        .await
        .unwrap();
    assert!(matches!(
        orders.update_status(&number, "paid").await,
        Err(OrderError::InsufficientStock {
            available: 3,
            requested: 4,
            ..
        })
    ));
    assert_eq!(product_stock(store.pool(), tee).await, 5);
    assert_eq!(product_stock(store.pool(), cap).await, 3);

    sqlx::query("UPDATE catalog.product SET stock = 4 WHERE id = $1")
        .bind(cap)
        .execute(store.pool())
        .await
        .unwrap();
    let order = orders.update_status(&number, "paid").await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(product_stock(store.pool(), tee).await, 3);
    assert_eq!(product_stock(store.pool(), cap).await, 0);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_foreign_rows_are_not_found() {
    let store = connect().await;
    let (_provider, gateway) = start_provider().await;
    let tee = seed_product(store.pool(), "Tee", 5).await;
    let (owner, stranger) = (fresh_caller(), fresh_caller());

    let carts = CartService::new(&store);
    let item = carts
        .upsert_item(owner, StockKey::product(tee), 1, QuantityMode::Add)
        .await
        .unwrap();
    assert!(matches!(
        carts.remove_item(stranger, item).await,
        Err(CartError::NotFound)
    ));
    assert!(matches!(
        carts.set_item_quantity(stranger, item, 2).await,
        Err(CartError::NotFound)
    ));

    let receipt = CheckoutService::new(&store, &gateway)
        .checkout(&Caller::customer(owner), inline_address())
        .await
        .unwrap();
    let orders = OrderService::new(&store, &gateway);
    assert!(matches!(
        orders.cancel(stranger, &receipt.order.number).await,
        Err(OrderError::NotFound)
    ));
    assert!(matches!(
        orders
            .detail(&Caller::customer(stranger), &receipt.order.number)
            .await,
        Err(OrderError::NotFound)
    ));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_outbox_claim_is_exclusive() {
    let store = connect().await;
    let (provider, gateway) = start_provider().await;
    let tee = seed_product(store.pool(), "Tee", 5).await;
    let caller = fresh_caller();

    CartService::new(&store)
        .upsert_item(caller, StockKey::product(tee), 1, QuantityMode::Add)
        .await
        .unwrap();
    provider.set_failing(true);
    let receipt = CheckoutService::new(&store, &gateway)
        .checkout(&Caller::customer(caller), inline_address())
        .await
        .unwrap();
    provider.set_failing(false);

    let id: cartwright_core::OutboxId = sqlx::query_scalar(
        "SELECT id FROM shop.payment_outbox WHERE order_id = $1 AND kind = $2",
    )
    .bind(receipt.order.id)
    .bind(OutboxKind::CreatePayment)
    .fetch_one(store.pool())
    .await
    .unwrap();

    let dispatcher = OutboxDispatcher::new(&store, &gateway);
    let (first, second) = tokio::join!(dispatcher.dispatch(id), dispatcher.dispatch(id));
    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, DispatchOutcome::PaymentCreated { .. }))
            .count(),
        1
    );
    assert_eq!(provider.created().len(), 1);

    let mut tx = store.begin().await.unwrap();
    let order = tx.order_by_id(receipt.order.id, false).await.unwrap().unwrap();
    assert!(order.transaction_id.is_some());
    assert!(matches!(
        tx.set_transaction_id(order.id, "txn-other").await,
        Err(cartwright_api::db::RepositoryError::Conflict(_))
    ));
}
