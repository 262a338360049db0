//! PostgreSQL integration tests
//!
//! These tests need a Docker daemon and share one PostgreSQL container.
//! Run with:
//!
//! ```bash
//! cargo test -p storage --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{BuyerId, OrderId, ProductId, SellerId, SessionToken};
use domain::order::{CheckoutRequest, assemble_order};
use domain::{
    Cart, CartItem, CartOwner, CartStatus, CustomerContact, LineRefresh, Money, NewOrder,
    OrderNumber, OrderStatus, ProductSnapshot, ShippingAddress,
};
use sqlx::PgPool;
use storage::{
    CartStore, OrderQuery, OrderStore, OutboxMessage, OutboxStore, PostgresStore, StorageError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE outbox, order_items, orders, cart_items, carts")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn product(price: i64) -> ProductSnapshot {
    ProductSnapshot::new(ProductId::new(), "Kopi Gayo", Money::from_major(price))
}

fn new_order(buyer_id: BuyerId, cart: Option<&Cart>) -> NewOrder {
    let shipping_address = ShippingAddress {
        recipient_name: "Rina".to_string(),
        phone: "0815".to_string(),
        street: "Jl. Gajah Mada 3".to_string(),
        district: Some("Gambir".to_string()),
        city: "Jakarta".to_string(),
        province: "DKI Jakarta".to_string(),
        postal_code: "10130".to_string(),
        country: "Indonesia".to_string(),
    };
    let request = CheckoutRequest {
        buyer_id,
        contact: CustomerContact::from_address(&shipping_address),
        shipping_address,
        currency: "IDR".to_string(),
    };
    assemble_order(cart, request, OrderNumber::generate(Utc::now()), Utc::now())
}

fn created_message(order_id: OrderId) -> OutboxMessage {
    OutboxMessage::new("order.created", order_id, serde_json::json!({"orderId": order_id}))
}

async fn cart_with(store: &PostgresStore, owner: &CartOwner, lines: &[(&ProductSnapshot, u32)]) -> Cart {
    let cart = store.get_or_create_active_cart(owner, "IDR").await.unwrap();
    for (product, quantity) in lines {
        store
            .insert_item(CartItem::from_snapshot(cart.id, product, *quantity, Utc::now()))
            .await
            .unwrap();
    }
    store.recalculate_totals(cart.id).await.unwrap();
    store.get_cart(cart.id).await.unwrap().unwrap()
}

async fn count(store: &PostgresStore, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_get_or_create_yields_one_active_cart() {
    let store = get_test_store().await;
    let owner = CartOwner::Buyer(BuyerId::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        let owner = owner.clone();
        handles.push(tokio::spawn(async move {
            store.get_or_create_active_cart(&owner, "IDR").await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM carts WHERE buyer_id = $1 AND status = 'active'",
    )
    .bind(owner.buyer_id().unwrap().as_uuid())
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn guest_cart_roundtrip() {
    let store = get_test_store().await;
    let owner = CartOwner::Guest(SessionToken::new("guest-session-1"));

    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    let found = store.find_active_cart(&owner).await.unwrap().unwrap();
    assert_eq!(found.id, cart.id);
    assert_eq!(found.owner, owner);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn duplicate_line_insert_conflicts() {
    let store = get_test_store().await;
    let owner = CartOwner::Buyer(BuyerId::new());
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    let product = product(100);

    store
        .insert_item(CartItem::from_snapshot(cart.id, &product, 1, Utc::now()))
        .await
        .unwrap();
    let result = store
        .insert_item(CartItem::from_snapshot(cart.id, &product, 1, Utc::now()))
        .await;

    assert!(matches!(result, Err(StorageError::Conflict(_))));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_merges_do_not_lose_updates() {
    let store = get_test_store().await;
    let owner = CartOwner::Buyer(BuyerId::new());
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    let product = product(100);

    let item = store
        .insert_item(CartItem::from_snapshot(cart.id, &product, 1, Utc::now()))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let refresh = LineRefresh::from_snapshot(&product, 1, Utc::now());
        handles.push(tokio::spawn(async move {
            store.merge_item(item.id, &refresh).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.get_cart(cart.id).await.unwrap().unwrap();
    assert_eq!(stored.items[0].quantity, 21);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn merge_refreshes_drift_and_totals_follow() {
    let store = get_test_store().await;
    let owner = CartOwner::Buyer(BuyerId::new());
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    let product = product(100);

    let item = store
        .insert_item(CartItem::from_snapshot(cart.id, &product, 2, Utc::now()))
        .await
        .unwrap();
    let totals = store.recalculate_totals(cart.id).await.unwrap();
    assert_eq!(totals.subtotal, Money::from_major(200));

    let live = ProductSnapshot {
        price: Money::from_major(120),
        ..product
    };
    let merged = store
        .merge_item(item.id, &LineRefresh::from_snapshot(&live, 1, Utc::now()))
        .await
        .unwrap();
    assert_eq!(merged.quantity, 3);
    assert!(merged.price_changed);
    assert_eq!(merged.snapshot_unit_price, Money::from_major(100));
    assert_eq!(merged.current_unit_price, Money::from_major(120));

    let first = store.recalculate_totals(cart.id).await.unwrap();
    let second = store.recalculate_totals(cart.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.item_count, 3);
    assert_eq!(first.subtotal, Money::from_major(360));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn scaled_price_merge_is_not_drift() {
    let store = get_test_store().await;
    let owner = CartOwner::Buyer(BuyerId::new());
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    let product = ProductSnapshot::new(
        ProductId::new(),
        "Gula Aren",
        Money::new(rust_decimal::Decimal::new(10_005, 3)),
    )
    .rounded();

    let item = store
        .insert_item(CartItem::from_snapshot(cart.id, &product, 1, Utc::now()))
        .await
        .unwrap();
    let merged = store
        .merge_item(item.id, &LineRefresh::from_snapshot(&product, 1, Utc::now()))
        .await
        .unwrap();

    assert!(!merged.price_changed);
    assert_eq!(merged.current_unit_price.to_string(), "10.01");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn merge_carts_folds_guest_lines_once() {
    let store = get_test_store().await;
    let buyer = CartOwner::Buyer(BuyerId::new());
    let guest = CartOwner::Guest(SessionToken::new("guest-merge-1"));
    let shared = product(100);
    let guest_only = product(30);

    let source = cart_with(&store, &guest, &[(&shared, 2), (&guest_only, 1)]).await;
    let target = cart_with(&store, &buyer, &[(&shared, 1)]).await;
    let line = target.find_product(shared.product_id).unwrap().id;
    let live = ProductSnapshot {
        price: Money::from_major(120),
        ..shared.clone()
    };
    store
        .merge_item(line, &LineRefresh::from_snapshot(&live, 1, Utc::now()))
        .await
        .unwrap();

    assert_eq!(store.merge_carts(source.id, target.id).await.unwrap(), 2);
    assert_eq!(store.merge_carts(source.id, target.id).await.unwrap(), 0);

    let merged = store.get_cart(target.id).await.unwrap().unwrap();
    let kept = merged.find_product(shared.product_id).unwrap();
    assert_eq!(kept.quantity, 4);
    assert_eq!(kept.current_unit_price, Money::from_major(120));
    assert!(kept.price_changed);
    assert_eq!(merged.items.len(), 2);
    assert_eq!(merged.item_count, 5);
    assert_eq!(merged.subtotal, Money::from_major(510));
    assert!(store.find_active_cart(&guest).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_merge_carts_fold_once() {
    let store = get_test_store().await;
    let buyer = CartOwner::Buyer(BuyerId::new());
    let guest = CartOwner::Guest(SessionToken::new("guest-merge-2"));
    let a = product(10);
    let b = product(20);

    let source = cart_with(&store, &guest, &[(&a, 2), (&b, 2)]).await;
    let target = cart_with(&store, &buyer, &[(&a, 1), (&b, 1)]).await;

    let (source_id, target_id) = (source.id, target.id);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.merge_carts(source_id, target_id).await
        }));
    }
    let mut folded = 0;
    for handle in handles {
        folded += handle.await.unwrap().unwrap();
    }
    assert_eq!(folded, 2);

    let merged = store.get_cart(target.id).await.unwrap().unwrap();
    assert_eq!(merged.find_product(a.product_id).unwrap().quantity, 3);
    assert_eq!(merged.find_product(b.product_id).unwrap().quantity, 3);
    assert_eq!(merged.subtotal, Money::from_major(90));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn clear_and_status_change() {
    let store = get_test_store().await;
    let owner = CartOwner::Buyer(BuyerId::new());
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    store
        .insert_item(CartItem::from_snapshot(cart.id, &product(5), 3, Utc::now()))
        .await
        .unwrap();

    assert_eq!(store.delete_all_items(cart.id).await.unwrap(), 1);
    let totals = store.recalculate_totals(cart.id).await.unwrap();
    assert_eq!(totals.item_count, 0);
    assert!(totals.subtotal.is_zero());

    store
        .set_status(cart.id, CartStatus::Merged)
        .await
        .unwrap();
    assert!(store.find_active_cart(&owner).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn create_order_persists_lines_and_outbox() {
    let store = get_test_store().await;
    let buyer = BuyerId::new();
    let owner = CartOwner::Buyer(buyer);
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    store
        .insert_item(CartItem::from_snapshot(cart.id, &product(100), 3, Utc::now()))
        .await
        .unwrap();
    let cart = store.get_cart(cart.id).await.unwrap().unwrap();

    let id = OrderId::new();
    let order = store
        .create_order(id, new_order(buyer, Some(&cart)), vec![created_message(id)])
        .await
        .unwrap();

    let loaded = store.get_order(id).await.unwrap().unwrap();
    assert_eq!(loaded.order_number, order.order_number);
    assert_eq!(loaded.items.len(), 1);
    assert_eq!(loaded.items[0].quantity, 3);
    assert_eq!(loaded.subtotal, Money::from_major(300));
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(loaded.shipping_address.district.as_deref(), Some("Gambir"));
    assert_eq!(count(&store, "outbox").await, 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn failed_line_insert_rolls_back_order() {
    let store = get_test_store().await;
    let buyer = BuyerId::new();
    let owner = CartOwner::Buyer(buyer);
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    store
        .insert_item(CartItem::from_snapshot(cart.id, &product(100), 1, Utc::now()))
        .await
        .unwrap();
    let cart = store.get_cart(cart.id).await.unwrap().unwrap();

    // A zero quantity line violates the order_items check constraint.
    let mut order = new_order(buyer, Some(&cart));
    order.items[0].quantity = 0;

    let id = OrderId::new();
    let result = store.create_order(id, order, vec![created_message(id)]).await;

    assert!(matches!(result, Err(StorageError::Database(_))));
    assert_eq!(count(&store, "orders").await, 0);
    assert_eq!(count(&store, "order_items").await, 0);
    assert_eq!(count(&store, "outbox").await, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn duplicate_order_number_is_reported() {
    let store = get_test_store().await;
    let buyer = BuyerId::new();
    let order = new_order(buyer, None);

    store
        .create_order(OrderId::new(), order.clone(), vec![])
        .await
        .unwrap();
    let result = store.create_order(OrderId::new(), order, vec![]).await;

    assert!(matches!(result, Err(StorageError::DuplicateOrderNumber(_))));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn list_orders_by_seller_and_status() {
    let store = get_test_store().await;
    let buyer = BuyerId::new();
    let seller = SellerId::new();

    let owner = CartOwner::Buyer(buyer);
    let cart = store.get_or_create_active_cart(&owner, "IDR").await.unwrap();
    let seller_product = product(250).with_seller(seller);
    store
        .insert_item(CartItem::from_snapshot(cart.id, &seller_product, 1, Utc::now()))
        .await
        .unwrap();
    let cart = store.get_cart(cart.id).await.unwrap().unwrap();

    store
        .create_order(OrderId::new(), new_order(buyer, Some(&cart)), vec![])
        .await
        .unwrap();
    store
        .create_order(OrderId::new(), new_order(buyer, None), vec![])
        .await
        .unwrap();

    let by_seller = store
        .list_orders(OrderQuery::for_seller(seller))
        .await
        .unwrap();
    assert_eq!(by_seller.len(), 1);
    assert_eq!(by_seller[0].items[0].seller_id, Some(seller));

    let by_buyer = store
        .list_orders(OrderQuery::for_buyer(buyer).status(OrderStatus::Pending).limit(1))
        .await
        .unwrap();
    assert_eq!(by_buyer.len(), 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn save_status_is_guarded() {
    let store = get_test_store().await;
    let id = OrderId::new();
    let mut order = store
        .create_order(id, new_order(BuyerId::new(), None), vec![])
        .await
        .unwrap();

    order.advance(OrderStatus::Paid, Utc::now()).unwrap();
    store
        .save_status(&order, OrderStatus::Pending, vec![created_message(id)])
        .await
        .unwrap();

    let stale = store.save_status(&order, OrderStatus::Pending, vec![]).await;
    assert!(matches!(stale, Err(StorageError::Conflict(_))));

    let loaded = store.get_order(id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Paid);
    assert!(loaded.paid_at.is_some());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn outbox_delivery_bookkeeping() {
    let store = get_test_store().await;
    let id = OrderId::new();
    store
        .create_order(id, new_order(BuyerId::new(), None), vec![created_message(id)])
        .await
        .unwrap();

    let pending = store.pending(10, 2).await.unwrap();
    assert_eq!(pending.len(), 1);
    let message_id = pending[0].id;

    store.record_failure(message_id, "broker down").await.unwrap();
    let pending = store.pending(10, 2).await.unwrap();
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[0].last_error.as_deref(), Some("broker down"));

    assert_eq!(store.pending_for(id.as_uuid(), 2).await.unwrap().len(), 1);
    assert!(
        store
            .pending_for(OrderId::new().as_uuid(), 2)
            .await
            .unwrap()
            .is_empty()
    );

    store.mark_delivered(message_id).await.unwrap();
    assert!(store.pending(10, 2).await.unwrap().is_empty());
    assert!(store.pending_for(id.as_uuid(), 2).await.unwrap().is_empty());
}
