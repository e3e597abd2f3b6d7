//! Postgres repository tests.
//!
//! These need a disposable database:
//!
//! ```bash
//! DROPLINE_TEST_DATABASE_URL=postgres://localhost/dropline_test \
//!     cargo test -p dropline-integration-tests -- --ignored
//! ```

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use dropline_core::{
    Currency, Email, FulfillmentReceipt, Money, NewCustomer, NewOrder, NewOrderItem, OrderNumber,
    OrderStatus, PersonName,
};
use dropline_webhooks::db::{OrderRepository, ProductRepository, ProductUpsert};
use dropline_webhooks::pipeline::{InventoryLedger, OrderStore};
use rust_decimal::Decimal;
use sqlx::PgPool;

async fn pool() -> PgPool {
    let url = std::env::var("DROPLINE_TEST_DATABASE_URL")
        .expect("DROPLINE_TEST_DATABASE_URL must be set");
    let pool = PgPool::connect(&url).await.unwrap();
    sqlx::migrate!("../webhooks/migrations")
        .run(&pool)
        .await
        .unwrap();
    pool
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().timestamp_nanos_opt().unwrap())
}

async fn new_order(repo: &OrderRepository, session_id: &str) -> NewOrder {
    let customer = repo
        .upsert_customer(&NewCustomer {
            email: Email::parse(&format!("{session_id}@example.com")).unwrap(),
            name: PersonName::from_display("Ada Lovelace"),
            phone: None,
        })
        .await
        .unwrap();

    NewOrder {
        order_number: OrderNumber::generate(Utc::now()),
        session_id: session_id.to_string(),
        customer_id: customer.id,
        total: Money::from_minor_units(4990, Currency::usd()),
        items: vec![NewOrderItem {
            sku: "X".to_string(),
            product_name: "Widget".to_string(),
            quantity: 2,
            unit_price: Decimal::new(2495, 2),
            variant_id: None,
        }],
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DROPLINE_TEST_DATABASE_URL)"]
async fn test_create_order_is_idempotent_per_session() {
    let repo = OrderRepository::new(pool().await);
    let session_id = unique("cs_pg");
    let order = new_order(&repo, &session_id).await;

    let first = repo.create_order(&order).await.unwrap();
    assert!(!first.is_duplicate());
    assert_eq!(first.order().items.len(), 1);

    let mut retry = order.clone();
    retry.order_number = OrderNumber::generate(Utc::now());
    let second = repo.create_order(&retry).await.unwrap();
    assert!(second.is_duplicate());
    assert_eq!(second.order().id, first.order().id);
    assert_eq!(second.order().order_number, first.order().order_number);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DROPLINE_TEST_DATABASE_URL)"]
async fn test_status_only_moves_forward() {
    let repo = OrderRepository::new(pool().await);
    let order = new_order(&repo, &unique("cs_pg_status")).await;
    let id = repo.create_order(&order).await.unwrap().order().id;

    assert!(repo.update_order_status(id, OrderStatus::Paid).await.unwrap());
    assert!(!repo.update_order_status(id, OrderStatus::Paid).await.unwrap());
    assert!(!repo.update_order_status(id, OrderStatus::Pending).await.unwrap());
    assert!(repo.update_order_status(id, OrderStatus::Shipped).await.unwrap());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DROPLINE_TEST_DATABASE_URL)"]
async fn test_record_fulfillment_persists_reference() {
    let repo = OrderRepository::new(pool().await);
    let session_id = unique("cs_pg_fulfil");
    let order = new_order(&repo, &session_id).await;
    let id = repo.create_order(&order).await.unwrap().order().id;

    repo.record_fulfillment(
        id,
        &FulfillmentReceipt {
            external_order_id: "ext-42".to_string(),
            external_order_number: Some("CJ42".to_string()),
        },
    )
    .await
    .unwrap();

    let stored = repo.get_by_session_id(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.fulfillment_order_id.as_deref(), Some("ext-42"));
    assert_eq!(stored.fulfillment_order_number.as_deref(), Some("CJ42"));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DROPLINE_TEST_DATABASE_URL)"]
async fn test_decrement_never_goes_negative() {
    let repo = ProductRepository::new(pool().await);
    let sku = unique("SKU");
    let product = repo
        .upsert(&ProductUpsert {
            sku: sku.clone(),
            name: "Widget".to_string(),
            stock: 3,
            fulfillment_variant_id: None,
        })
        .await
        .unwrap();

    let results = futures::future::join_all(
        (0..5).map(|_| repo.decrement_stock(product.id, 1)),
    )
    .await;
    let applied = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Some(_))))
        .count();

    assert_eq!(applied, 3);
    let remaining = repo.find_product_by_sku(&sku).await.unwrap().unwrap();
    assert_eq!(remaining.stock, 0);
}
