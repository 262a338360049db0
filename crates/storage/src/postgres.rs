use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    BrandId, BuyerId, CartId, CartItemId, MessageId, OrderId, OrderItemId, ProductId, SellerId,
    SessionToken, VariantId,
};
use domain::{
    Cart, CartItem, CartOwner, CartStatus, CartTotals, CustomerContact, DomainError, LineRefresh,
    Money, NewOrder, Order, OrderItem, OrderStatus, ProductDetails, ShippingAddress,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CartStore, OrderQuery, OrderStore, OutboxMessage, OutboxStore, Result, StorageError,
};

const CART_COLUMNS: &str = "id, buyer_id, session_id, status, currency, item_count, subtotal, \
     last_activity_at, created_at, updated_at";

const CART_ITEM_COLUMNS: &str = "id, cart_id, item_type, product_id, variant_id, brand_id, \
     seller_id, quantity, product_name, variant_name, sku, image_url, brand_name, seller_name, \
     unit_price, compare_price, current_unit_price, price_changed, price_last_checked_at, \
     is_available, availability_message, added_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, buyer_id, source, status, currency, subtotal, \
     shipping_cost, tax_amount, discount_amount, total_amount, recipient_name, recipient_phone, \
     shipping_street, shipping_district, shipping_city, shipping_province, shipping_postal_code, \
     shipping_country, contact_name, contact_phone, contact_email, source_cart_id, paid_at, \
     shipped_at, delivered_at, cancelled_at, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, item_type, product_id, variant_id, brand_id, \
     seller_id, product_name, variant_name, sku, image_url, brand_name, seller_name, quantity, \
     unit_price, subtotal, created_at";

const OUTBOX_COLUMNS: &str =
    "id, topic, aggregate_id, payload, attempts, last_error, created_at, delivered_at";

/// PostgreSQL-backed implementation of every store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_cart(&self, row: Option<PgRow>) -> Result<Option<Cart>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let cart_id = CartId::from_uuid(row.try_get("id")?);

        let mut conn = self.pool.acquire().await?;
        let items = fetch_cart_items(&mut conn, cart_id, false).await?;
        Ok(Some(row_to_cart(&row, items)?))
    }

    async fn load_order_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY created_at ASC, id ASC"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = row_to_order_item(row)?;
            grouped
                .entry(item.order_id.as_uuid())
                .or_default()
                .push(item);
        }
        Ok(grouped)
    }
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StorageError::Decode(format!("{column} is negative: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StorageError::Decode(format!("{column} too large: {value}")))
}

fn quantity_column(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| {
        StorageError::Rejected(DomainError::InvalidQuantity {
            quantity: i64::from(quantity),
        })
    })
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::new(row.try_get::<Decimal, _>(column)?))
}

fn optional_money(row: &PgRow, column: &str) -> Result<Option<Money>> {
    Ok(row.try_get::<Option<Decimal>, _>(column)?.map(Money::new))
}

fn optional_id<T: From<Uuid>>(row: &PgRow, column: &str) -> Result<Option<T>> {
    Ok(row.try_get::<Option<Uuid>, _>(column)?.map(T::from))
}

fn row_to_cart(row: &PgRow, items: Vec<CartItem>) -> Result<Cart> {
    let buyer_id: Option<Uuid> = row.try_get("buyer_id")?;
    let session_id: Option<String> = row.try_get("session_id")?;
    let owner = match (buyer_id, session_id) {
        (Some(id), _) => CartOwner::Buyer(BuyerId::from_uuid(id)),
        (None, Some(token)) => CartOwner::Guest(SessionToken::new(token)),
        (None, None) => {
            return Err(StorageError::Decode(
                "cart has neither buyer nor session".to_string(),
            ));
        }
    };

    Ok(Cart {
        id: CartId::from_uuid(row.try_get("id")?),
        owner,
        status: row.try_get::<String, _>("status")?.parse::<CartStatus>()?,
        currency: row.try_get("currency")?,
        item_count: to_u32(row.try_get("item_count")?, "item_count")?,
        subtotal: money(row, "subtotal")?,
        items,
        last_activity_at: row.try_get("last_activity_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get("id")?),
        cart_id: CartId::from_uuid(row.try_get("cart_id")?),
        item_type: row.try_get::<String, _>("item_type")?.parse()?,
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        variant_id: optional_id::<VariantId>(row, "variant_id")?,
        brand_id: optional_id::<BrandId>(row, "brand_id")?,
        seller_id: optional_id::<SellerId>(row, "seller_id")?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        details: row_to_details(row)?,
        snapshot_unit_price: money(row, "unit_price")?,
        compare_price: optional_money(row, "compare_price")?,
        current_unit_price: money(row, "current_unit_price")?,
        price_changed: row.try_get("price_changed")?,
        price_last_checked_at: row.try_get("price_last_checked_at")?,
        is_available: row.try_get("is_available")?,
        availability_message: row.try_get("availability_message")?,
        added_at: row.try_get("added_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_details(row: &PgRow) -> Result<ProductDetails> {
    Ok(ProductDetails {
        product_name: row.try_get("product_name")?,
        variant_name: row.try_get("variant_name")?,
        sku: row.try_get("sku")?,
        image_url: row.try_get("image_url")?,
        brand_name: row.try_get("brand_name")?,
        seller_name: row.try_get("seller_name")?,
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        order_number: row.try_get::<String, _>("order_number")?.into(),
        buyer_id: BuyerId::from_uuid(row.try_get("buyer_id")?),
        source: row.try_get::<String, _>("source")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        currency: row.try_get("currency")?,
        subtotal: money(row, "subtotal")?,
        shipping_cost: money(row, "shipping_cost")?,
        tax_amount: money(row, "tax_amount")?,
        discount_amount: money(row, "discount_amount")?,
        total_amount: money(row, "total_amount")?,
        shipping_address: ShippingAddress {
            recipient_name: row.try_get("recipient_name")?,
            phone: row.try_get("recipient_phone")?,
            street: row.try_get("shipping_street")?,
            district: row.try_get("shipping_district")?,
            city: row.try_get("shipping_city")?,
            province: row.try_get("shipping_province")?,
            postal_code: row.try_get("shipping_postal_code")?,
            country: row.try_get("shipping_country")?,
        },
        contact: CustomerContact {
            name: row.try_get("contact_name")?,
            phone: row.try_get("contact_phone")?,
            email: row.try_get("contact_email")?,
        },
        source_cart_id: optional_id::<CartId>(row, "source_cart_id")?,
        items,
        paid_at: row.try_get("paid_at")?,
        shipped_at: row.try_get("shipped_at")?,
        delivered_at: row.try_get("delivered_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        item_type: row.try_get::<String, _>("item_type")?.parse()?,
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        variant_id: optional_id::<VariantId>(row, "variant_id")?,
        brand_id: optional_id::<BrandId>(row, "brand_id")?,
        seller_id: optional_id::<SellerId>(row, "seller_id")?,
        details: row_to_details(row)?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: money(row, "unit_price")?,
        subtotal: money(row, "subtotal")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_outbox(row: &PgRow) -> Result<OutboxMessage> {
    Ok(OutboxMessage {
        id: MessageId::from_uuid(row.try_get("id")?),
        topic: row.try_get("topic")?,
        aggregate_id: row.try_get("aggregate_id")?,
        payload: row.try_get("payload")?,
        attempts: to_u32(row.try_get("attempts")?, "attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        delivered_at: row.try_get("delivered_at")?,
    })
}

async fn insert_outbox(conn: &mut PgConnection, message: &OutboxMessage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox (id, topic, aggregate_id, payload, attempts, last_error, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(message.id.as_uuid())
    .bind(&message.topic)
    .bind(message.aggregate_id)
    .bind(&message.payload)
    .bind(to_i32(message.attempts, "attempts")?)
    .bind(&message.last_error)
    .bind(message.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_cart_items(
    conn: &mut PgConnection,
    cart_id: CartId,
    lock: bool,
) -> Result<Vec<CartItem>> {
    let lock = if lock { " FOR UPDATE" } else { "" };
    let rows = sqlx::query(&format!(
        "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 \
         ORDER BY added_at ASC, id ASC{lock}"
    ))
    .bind(cart_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_cart_item).collect()
}

async fn insert_cart_item(conn: &mut PgConnection, item: &CartItem) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO cart_items ({CART_ITEM_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
          $19, $20, $21, $22, $23)"
    ))
    .bind(item.id.as_uuid())
    .bind(item.cart_id.as_uuid())
    .bind(item.item_type.as_str())
    .bind(item.product_id.as_uuid())
    .bind(item.variant_id.map(|id| id.as_uuid()))
    .bind(item.brand_id.map(|id| id.as_uuid()))
    .bind(item.seller_id.map(|id| id.as_uuid()))
    .bind(quantity_column(item.quantity)?)
    .bind(&item.details.product_name)
    .bind(&item.details.variant_name)
    .bind(&item.details.sku)
    .bind(&item.details.image_url)
    .bind(&item.details.brand_name)
    .bind(&item.details.seller_name)
    .bind(item.snapshot_unit_price.amount())
    .bind(item.compare_price.map(|p| p.amount()))
    .bind(item.current_unit_price.amount())
    .bind(item.price_changed)
    .bind(item.price_last_checked_at)
    .bind(item.is_available)
    .bind(&item.availability_message)
    .bind(item.added_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if violates(&e, "cart_items_line_key") {
            return StorageError::Conflict(format!(
                "cart {} already has a {} line for product {}",
                item.cart_id, item.item_type, item.product_id
            ));
        }
        if violates(&e, "cart_items_cart_id_fkey") {
            return StorageError::not_found("cart", item.cart_id);
        }
        StorageError::Database(e)
    })?;
    Ok(())
}

async fn write_totals(conn: &mut PgConnection, cart_id: CartId) -> Result<CartTotals> {
    let row = sqlx::query(
        r#"
        UPDATE carts SET
            item_count = agg.item_count,
            subtotal = agg.subtotal,
            last_activity_at = NOW(),
            updated_at = NOW()
        FROM (
            SELECT COALESCE(SUM(quantity), 0)::INTEGER AS item_count,
                   COALESCE(SUM(quantity * current_unit_price), 0)::NUMERIC(15, 2) AS subtotal
            FROM cart_items
            WHERE cart_id = $1
        ) AS agg
        WHERE carts.id = $1
        RETURNING carts.item_count, carts.subtotal
        "#,
    )
    .bind(cart_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StorageError::not_found("cart", cart_id))?;

    Ok(CartTotals {
        item_count: to_u32(row.try_get("item_count")?, "item_count")?,
        subtotal: money(&row, "subtotal")?,
    })
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_or_create_active_cart(&self, owner: &CartOwner, currency: &str) -> Result<Cart> {
        let now = Utc::now();

        // Losing a race against another creator hits the partial unique
        // index and inserts nothing; the select below then finds the winner.
        let inserted = sqlx::query(
            r#"
            INSERT INTO carts (id, buyer_id, session_id, status, currency, item_count, subtotal,
                               last_activity_at, created_at, updated_at)
            VALUES ($1, $2, $3, 'active', $4, 0, 0, $5, $5, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(CartId::new().as_uuid())
        .bind(owner.buyer_id().map(|id| id.as_uuid()))
        .bind(owner.session().map(|token| token.as_str()))
        .bind(currency)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            tracing::debug!(%owner, "active cart already exists");
        }

        self.find_active_cart(owner).await?.ok_or_else(|| {
            StorageError::Conflict(format!("active cart for {owner} changed during creation"))
        })
    }

    async fn find_active_cart(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        let row = match owner {
            CartOwner::Buyer(buyer_id) => {
                sqlx::query(&format!(
                    "SELECT {CART_COLUMNS} FROM carts WHERE buyer_id = $1 AND status = 'active'"
                ))
                .bind(buyer_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
            }
            CartOwner::Guest(token) => {
                sqlx::query(&format!(
                    "SELECT {CART_COLUMNS} FROM carts \
                     WHERE buyer_id IS NULL AND session_id = $1 AND status = 'active'"
                ))
                .bind(token.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        self.load_cart(row).await
    }

    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        self.load_cart(row).await
    }

    async fn insert_item(&self, item: CartItem) -> Result<CartItem> {
        let mut conn = self.pool.acquire().await?;
        insert_cart_item(&mut conn, &item).await?;
        Ok(item)
    }

    async fn merge_item(&self, item_id: CartItemId, refresh: &LineRefresh) -> Result<CartItem> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE cart_items SET
                quantity = quantity + $2,
                price_changed = (unit_price <> $3),
                current_unit_price = $3,
                is_available = $4,
                availability_message = $5,
                price_last_checked_at = $6,
                updated_at = $6
            WHERE id = $1
            RETURNING {CART_ITEM_COLUMNS}
            "#
        ))
        .bind(item_id.as_uuid())
        .bind(quantity_column(refresh.quantity_delta)?)
        .bind(refresh.live_unit_price.amount())
        .bind(refresh.is_available)
        .bind(&refresh.availability_message)
        .bind(refresh.checked_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_cart_item(&row),
            None => Err(StorageError::not_found("cart item", item_id)),
        }
    }

    async fn merge_carts(&self, guest_id: CartId, target_id: CartId) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        // Both cart rows stay locked until commit, in id order, so merges of
        // the same guest cart queue up behind each other.
        let rows = sqlx::query(
            "SELECT id, status FROM carts WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(vec![guest_id.as_uuid(), target_id.as_uuid()])
        .fetch_all(&mut *tx)
        .await?;

        let mut statuses = HashMap::new();
        for row in &rows {
            let id: Uuid = row.try_get("id")?;
            let status = row.try_get::<String, _>("status")?.parse::<CartStatus>()?;
            statuses.insert(id, status);
        }
        let guest_status = statuses
            .get(&guest_id.as_uuid())
            .ok_or_else(|| StorageError::not_found("cart", guest_id))?;
        if !guest_status.accepts_items() {
            return Ok(0);
        }
        let target_status = statuses
            .get(&target_id.as_uuid())
            .ok_or_else(|| StorageError::not_found("cart", target_id))?;
        if !target_status.accepts_items() {
            return Err(StorageError::Conflict(format!(
                "cart {target_id} is {target_status}, cannot take lines"
            )));
        }

        let guest_lines = fetch_cart_items(&mut tx, guest_id, false).await?;
        let mut target_lines = fetch_cart_items(&mut tx, target_id, true).await?;

        let now = Utc::now();
        for line in &guest_lines {
            match target_lines.iter_mut().find(|item| item.key() == line.key()) {
                Some(existing) => {
                    existing
                        .absorb_line(line, now)
                        .map_err(StorageError::Rejected)?;
                    sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = $3 WHERE id = $1")
                        .bind(existing.id.as_uuid())
                        .bind(quantity_column(existing.quantity)?)
                        .bind(now)
                        .execute(&mut *tx)
                        .await?;
                }
                None => insert_cart_item(&mut tx, &line.transfer_to(target_id, now)).await?,
            }
        }

        sqlx::query("UPDATE carts SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(guest_id.as_uuid())
            .bind(CartStatus::Merged.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        write_totals(&mut tx, target_id).await?;

        tx.commit().await?;
        Ok(guest_lines.len())
    }

    async fn remove_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id.as_uuid())
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("cart item", item_id));
        }
        Ok(())
    }

    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn recalculate_totals(&self, cart_id: CartId) -> Result<CartTotals> {
        let mut conn = self.pool.acquire().await?;
        write_totals(&mut conn, cart_id).await
    }

    async fn set_status(&self, cart_id: CartId, status: CartStatus) -> Result<()> {
        let result = sqlx::query("UPDATE carts SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(cart_id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if violates(&e, "carts_one_active_per_buyer")
                    || violates(&e, "carts_one_active_per_session")
                {
                    return StorageError::Conflict(format!(
                        "owner of cart {cart_id} already has an active cart"
                    ));
                }
                StorageError::Database(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("cart", cart_id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(
        &self,
        id: OrderId,
        order: NewOrder,
        messages: Vec<OutboxMessage>,
    ) -> Result<Order> {
        let order = order.persisted(id);
        let mut tx = self.pool.begin().await?;

        // Order row first, lines after, all inside one transaction.
        let order_id: Uuid = sqlx::query_scalar(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
              $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29) RETURNING id"
        ))
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.buyer_id.as_uuid())
        .bind(order.source.as_str())
        .bind(order.status.as_str())
        .bind(&order.currency)
        .bind(order.subtotal.amount())
        .bind(order.shipping_cost.amount())
        .bind(order.tax_amount.amount())
        .bind(order.discount_amount.amount())
        .bind(order.total_amount.amount())
        .bind(&order.shipping_address.recipient_name)
        .bind(&order.shipping_address.phone)
        .bind(&order.shipping_address.street)
        .bind(&order.shipping_address.district)
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.province)
        .bind(&order.shipping_address.postal_code)
        .bind(&order.shipping_address.country)
        .bind(&order.contact.name)
        .bind(&order.contact.phone)
        .bind(&order.contact.email)
        .bind(order.source_cart_id.map(|id| id.as_uuid()))
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if violates(&e, "orders_order_number_key") {
                return StorageError::DuplicateOrderNumber(order.order_number.to_string());
            }
            if violates(&e, "orders_pkey") {
                return StorageError::Conflict(format!("order {} already exists", order.id));
            }
            StorageError::Database(e)
        })?;

        for item in &order.items {
            sqlx::query(&format!(
                "INSERT INTO order_items ({ORDER_ITEM_COLUMNS}) VALUES \
                 ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
            ))
            .bind(item.id.as_uuid())
            .bind(order_id)
            .bind(item.item_type.as_str())
            .bind(item.product_id.as_uuid())
            .bind(item.variant_id.map(|id| id.as_uuid()))
            .bind(item.brand_id.map(|id| id.as_uuid()))
            .bind(item.seller_id.map(|id| id.as_uuid()))
            .bind(&item.details.product_name)
            .bind(&item.details.variant_name)
            .bind(&item.details.sku)
            .bind(&item.details.image_url)
            .bind(&item.details.brand_name)
            .bind(&item.details.seller_name)
            .bind(to_i32(item.quantity, "quantity")?)
            .bind(item.unit_price.amount())
            .bind(item.subtotal.amount())
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for message in &messages {
            insert_outbox(&mut *tx, message).await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = self.load_order_items(&[id.as_uuid()]).await?;
        let items = items.remove(&id.as_uuid()).unwrap_or_default();
        Ok(Some(row_to_order(&row, items)?))
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE 1=1");
        let mut param_count = 0;

        if query.buyer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.buyer_id = ${param_count}"));
        }
        if query.seller_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = o.id AND oi.seller_id = ${param_count})"
            ));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.status = ${param_count}"));
        }

        sql.push_str(" ORDER BY o.created_at DESC, o.id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(buyer_id) = query.buyer_id {
            sqlx_query = sqlx_query.bind(buyer_id.as_uuid());
        }
        if let Some(seller_id) = query.seller_id {
            sqlx_query = sqlx_query.bind(seller_id.as_uuid());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_order_items(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn save_status(
        &self,
        order: &Order,
        expected: OrderStatus,
        messages: Vec<OutboxMessage>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $3,
                paid_at = $4,
                shipped_at = $5,
                delivered_at = $6,
                cancelled_at = $7,
                updated_at = $8
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(expected.as_str())
        .bind(order.status.as_str())
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                    .bind(order.id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some(status) => StorageError::Conflict(format!(
                    "order {} is {status}, expected {expected}",
                    order.id
                )),
                None => StorageError::not_found("order", order.id),
            });
        }

        for message in &messages {
            insert_outbox(&mut *tx, message).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox \
             WHERE delivered_at IS NULL AND attempts < $2 \
             ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .bind(to_i32(max_attempts, "max_attempts")?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_outbox).collect()
    }

    async fn pending_for(&self, aggregate_id: Uuid, max_attempts: u32) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox \
             WHERE aggregate_id = $1 AND delivered_at IS NULL AND attempts < $2 \
             ORDER BY created_at ASC"
        ))
        .bind(aggregate_id)
        .bind(to_i32(max_attempts, "max_attempts")?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_outbox).collect()
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox SET delivered_at = $2, attempts = attempts + 1 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("outbox message", id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: MessageId, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("outbox message", id));
        }
        Ok(())
    }
}
