//! Postgres store on sqlx. Every stock change runs inside a transaction
//! together with its inventory log rows.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{AppointmentFilter, OrderFilter, ReviewFilter, Store};
use crate::domain::aggregates::{
    Address, Adjustment, Appointment, Cart, CartLine, Category, InventoryChangeKind, InventoryLog, Order,
    OrderItem, OrderVersion, Payment, Product, Review, Service, StockChange, StockMove, User,
};
use crate::domain::value_objects::{ItemRef, Rating, Sku};
use crate::error::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EcommerceError::StorageError(e.to_string()))
    }
}

fn qty_to_db(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}

fn qty_from_db(quantity: i32) -> Result<u32> {
    u32::try_from(quantity).map_err(|_| EcommerceError::StorageError(format!("negative quantity {quantity}")))
}

fn item_ref(kind: &str, id: Uuid) -> Result<ItemRef> {
    Ok(ItemRef { kind: kind.parse()?, id })
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid, name: String, slug: String, description: Option<String>, parent_id: Option<Uuid>,
    kind: String, active: bool, display_order: i32, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<CategoryRow> for Category {
    type Error = EcommerceError;
    fn try_from(r: CategoryRow) -> Result<Self> {
        Ok(Category {
            id: r.id, name: r.name, slug: r.slug, description: r.description, parent_id: r.parent_id,
            kind: r.kind.parse()?, active: r.active, display_order: r.display_order,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, slug: String, sku: String, description: Option<String>, price: Decimal,
    sale_price: Option<Decimal>, category_id: Option<Uuid>, stock_quantity: i32, low_stock_threshold: i32,
    featured: bool, active: bool, image: Option<String>, weight: Option<Decimal>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>, deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for Product {
    type Error = EcommerceError;
    fn try_from(r: ProductRow) -> Result<Self> {
        let sku = Sku::new(r.sku).map_err(|e| EcommerceError::StorageError(e.to_string()))?;
        Ok(Product {
            id: r.id, name: r.name, slug: r.slug, sku, description: r.description, price: r.price,
            sale_price: r.sale_price, category_id: r.category_id, stock_quantity: r.stock_quantity,
            low_stock_threshold: r.low_stock_threshold, featured: r.featured, active: r.active, image: r.image,
            weight: r.weight, created_at: r.created_at, updated_at: r.updated_at, deleted_at: r.deleted_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid, name: String, slug: String, description: Option<String>, price: Decimal,
    sale_price: Option<Decimal>, duration_minutes: i32, category_id: Option<Uuid>, featured: bool,
    active: bool, image: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<ServiceRow> for Service {
    fn from(r: ServiceRow) -> Self {
        Service {
            id: r.id, name: r.name, slug: r.slug, description: r.description, price: r.price,
            sale_price: r.sale_price, duration_minutes: r.duration_minutes, category_id: r.category_id,
            featured: r.featured, active: r.active, image: r.image, created_at: r.created_at,
            updated_at: r.updated_at, deleted_at: r.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid, name: String, email: String, phone: Option<String>, address: Option<String>,
    city: Option<String>, state: Option<String>, zip_code: Option<String>, role: String, active: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = EcommerceError;
    fn try_from(r: UserRow) -> Result<Self> {
        Ok(User {
            id: r.id, name: r.name, email: r.email, phone: r.phone, address: r.address, city: r.city,
            state: r.state, zip_code: r.zip_code, role: r.role.parse()?, active: r.active,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow { id: Uuid, item_type: String, item_id: Uuid, quantity: i32, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, user_id: Uuid, customer_name: String, customer_email: String,
    status: String, payment_status: String, payment_method: String, subtotal: Decimal, shipping: Decimal,
    tax: Decimal, discount: Decimal, total: Decimal, shipping_address: Json<Address>,
    tracking_number: Option<String>, notes: Option<String>, stock_reserved: bool,
    paid_at: Option<DateTime<Utc>>, shipped_at: Option<DateTime<Utc>>, delivered_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: self.id, order_number: self.order_number, user_id: self.user_id,
            customer_name: self.customer_name, customer_email: self.customer_email,
            status: self.status.parse()?, payment_status: self.payment_status.parse()?,
            payment_method: self.payment_method.parse()?, items, subtotal: self.subtotal,
            shipping: self.shipping, tax: self.tax, discount: self.discount, total: self.total,
            shipping_address: self.shipping_address.0, tracking_number: self.tracking_number,
            notes: self.notes, stock_reserved: self.stock_reserved, paid_at: self.paid_at,
            shipped_at: self.shipped_at, delivered_at: self.delivered_at, canceled_at: self.canceled_at,
            created_at: self.created_at, updated_at: self.updated_at, events: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid, order_id: Uuid, item_type: String, item_id: Uuid, name: String, sku: Option<String>,
    quantity: i32, unit_price: Decimal, total: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = EcommerceError;
    fn try_from(r: OrderItemRow) -> Result<Self> {
        Ok(OrderItem {
            id: r.id, item: item_ref(&r.item_type, r.item_id)?, name: r.name, sku: r.sku,
            quantity: qty_from_db(r.quantity)?, unit_price: r.unit_price, total: r.total,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid, order_id: Uuid, method: String, status: String, amount: Decimal, gateway: String,
    transaction_id: Option<String>, boleto_url: Option<String>, boleto_barcode: Option<String>,
    pix_qr_code: Option<String>, expires_at: Option<DateTime<Utc>>, card_last_four: Option<String>,
    card_brand: Option<String>, gateway_response: Option<serde_json::Value>, paid_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>, refunded_amount: Option<Decimal>, created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = EcommerceError;
    fn try_from(r: PaymentRow) -> Result<Self> {
        Ok(Payment {
            id: r.id, order_id: r.order_id, method: r.method.parse()?, status: r.status.parse()?,
            amount: r.amount, gateway: r.gateway, transaction_id: r.transaction_id, boleto_url: r.boleto_url,
            boleto_barcode: r.boleto_barcode, pix_qr_code: r.pix_qr_code, expires_at: r.expires_at,
            card_last_four: r.card_last_four, card_brand: r.card_brand, gateway_response: r.gateway_response,
            paid_at: r.paid_at, refunded_at: r.refunded_at, refunded_amount: r.refunded_amount,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InventoryLogRow {
    id: Uuid, product_id: Uuid, previous_stock: i32, new_stock: i32, adjustment: i32, kind: String,
    reason: Option<String>, order_id: Option<Uuid>, user_id: Option<String>, created_at: DateTime<Utc>,
}

impl TryFrom<InventoryLogRow> for InventoryLog {
    type Error = EcommerceError;
    fn try_from(r: InventoryLogRow) -> Result<Self> {
        Ok(InventoryLog {
            id: r.id, product_id: r.product_id, previous_stock: r.previous_stock, new_stock: r.new_stock,
            adjustment: r.adjustment, kind: r.kind.parse()?, reason: r.reason, order_id: r.order_id,
            user_id: r.user_id, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid, user_id: Uuid, item_type: String, item_id: Uuid, rating: i16, title: Option<String>,
    comment: String, status: String, verified_purchase: bool, admin_response: Option<String>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = EcommerceError;
    fn try_from(r: ReviewRow) -> Result<Self> {
        let rating = u8::try_from(r.rating)
            .ok()
            .and_then(Rating::new)
            .ok_or_else(|| EcommerceError::StorageError(format!("rating out of range: {}", r.rating)))?;
        Ok(Review {
            id: r.id, user_id: r.user_id, target: item_ref(&r.item_type, r.item_id)?, rating, title: r.title,
            comment: r.comment, status: r.status.parse()?, verified_purchase: r.verified_purchase,
            admin_response: r.admin_response, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid, user_id: Uuid, esthetician_id: Uuid, service_id: Uuid, scheduled_at: DateTime<Utc>,
    duration_minutes: i32, status: String, notes: Option<String>, is_paid: bool, order_id: Option<Uuid>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = EcommerceError;
    fn try_from(r: AppointmentRow) -> Result<Self> {
        Ok(Appointment {
            id: r.id, user_id: r.user_id, esthetician_id: r.esthetician_id, service_id: r.service_id,
            scheduled_at: r.scheduled_at, duration_minutes: r.duration_minutes, status: r.status.parse()?,
            notes: r.notes, is_paid: r.is_paid, order_id: r.order_id, created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = EcommerceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// =============================================================================
// Transactional helpers
// =============================================================================

async fn insert_log(conn: &mut sqlx::PgConnection, log: &InventoryLog) -> Result<()> {
    sqlx::query("INSERT INTO inventory_logs (id, product_id, previous_stock, new_stock, adjustment, kind, reason, order_id, user_id, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
        .bind(log.id).bind(log.product_id).bind(log.previous_stock).bind(log.new_stock).bind(log.adjustment)
        .bind(log.kind.as_str()).bind(&log.reason).bind(log.order_id).bind(&log.user_id).bind(log.created_at)
        .execute(conn).await?;
    Ok(())
}

async fn apply_moves(
    tx: &mut Transaction<'_, Postgres>,
    moves: &[StockMove],
    order_id: Uuid,
    reason: &str,
) -> Result<Vec<StockChange>> {
    let mut changes = Vec::with_capacity(moves.len());
    for m in moves {
        let updated: Option<(i32, i32)> = sqlx::query_as("UPDATE products SET stock_quantity = stock_quantity + $2, updated_at = NOW() WHERE id = $1 AND stock_quantity + $2 >= 0 RETURNING stock_quantity, low_stock_threshold")
            .bind(m.product_id).bind(m.delta).fetch_optional(&mut **tx).await?;
        let (current, threshold) = match updated {
            Some(row) => row,
            None => {
                let available: Option<(i32,)> = sqlx::query_as("SELECT stock_quantity FROM products WHERE id = $1")
                    .bind(m.product_id).fetch_optional(&mut **tx).await?;
                return Err(match available {
                    Some((available,)) => EcommerceError::InsufficientStock {
                        product_id: m.product_id,
                        requested: m.delta.unsigned_abs(),
                        available,
                    },
                    None => EcommerceError::ProductNotFound,
                });
            }
        };
        let change = StockChange { product_id: m.product_id, previous: current - m.delta, current, threshold };
        let log = InventoryLog::record(&change, m.kind, Some(reason.to_string())).for_order(order_id);
        insert_log(&mut **tx, &log).await?;
        changes.push(change);
    }
    Ok(changes)
}

async fn insert_order_rows(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
    sqlx::query("INSERT INTO orders (id, order_number, user_id, customer_name, customer_email, status, payment_status, payment_method, subtotal, shipping, tax, discount, total, shipping_address, tracking_number, notes, stock_reserved, paid_at, shipped_at, delivered_at, canceled_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)")
        .bind(order.id).bind(&order.order_number).bind(order.user_id).bind(&order.customer_name)
        .bind(&order.customer_email).bind(order.status.as_str()).bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str()).bind(order.subtotal).bind(order.shipping).bind(order.tax)
        .bind(order.discount).bind(order.total).bind(Json(&order.shipping_address))
        .bind(&order.tracking_number).bind(&order.notes).bind(order.stock_reserved).bind(order.paid_at)
        .bind(order.shipped_at).bind(order.delivered_at).bind(order.canceled_at).bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx).await?;
    for item in &order.items {
        sqlx::query("INSERT INTO order_items (id, order_id, item_type, item_id, name, sku, quantity, unit_price, total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(item.id).bind(order.id).bind(item.item.kind.as_str()).bind(item.item.id).bind(&item.name)
            .bind(&item.sku).bind(qty_to_db(item.quantity)).bind(item.unit_price).bind(item.total)
            .execute(&mut **tx).await?;
    }
    Ok(())
}

/// Conditional on the stored status and reservation flag still matching `expected`.
/// The row lock taken here holds until the surrounding transaction ends.
async fn update_order_row(tx: &mut Transaction<'_, Postgres>, order: &Order, expected: OrderVersion) -> Result<()> {
    let updated = sqlx::query("UPDATE orders SET status = $2, payment_status = $3, tracking_number = $4, notes = $5, stock_reserved = $6, paid_at = $7, shipped_at = $8, delivered_at = $9, canceled_at = $10, updated_at = $11 WHERE id = $1 AND status = $12 AND stock_reserved = $13")
        .bind(order.id).bind(order.status.as_str()).bind(order.payment_status.as_str())
        .bind(&order.tracking_number).bind(&order.notes).bind(order.stock_reserved).bind(order.paid_at)
        .bind(order.shipped_at).bind(order.delivered_at).bind(order.canceled_at).bind(order.updated_at)
        .bind(expected.status.as_str()).bind(expected.stock_reserved)
        .execute(&mut **tx).await?;
    if updated.rows_affected() == 1 {
        return Ok(());
    }
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1")
        .bind(order.id).fetch_optional(&mut **tx).await?;
    Err(if exists.is_some() { EcommerceError::OrderChanged } else { EcommerceError::OrderNotFound })
}

impl PgStore {
    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1)")
            .bind(&ids).fetch_all(&self.pool).await?;
        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            by_order.entry(order_id).or_default().push(OrderItem::try_from(row)?);
        }
        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }

    /// `expected` is `None` for a new order.
    async fn write_order(&self, order: &Order, expected: Option<OrderVersion>, moves: &[StockMove]) -> Result<Vec<StockChange>> {
        let mut tx = self.pool.begin().await?;
        match expected {
            Some(expected) => update_order_row(&mut tx, order, expected).await?,
            None => insert_order_rows(&mut tx, order).await?,
        }
        let changes = apply_moves(&mut tx, moves, order.id, &format!("order {}", order.order_number)).await?;
        tx.commit().await?;
        Ok(changes)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_category(&self, c: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, description, parent_id, kind, active, display_order, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).bind(c.parent_id).bind(c.kind.as_str())
            .bind(c.active).bind(c.display_order).bind(c.created_at).bind(c.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_category(&self, c: &Category) -> Result<()> {
        let done = sqlx::query("UPDATE categories SET name = $2, slug = $3, description = $4, parent_id = $5, kind = $6, active = $7, display_order = $8, updated_at = $9 WHERE id = $1")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).bind(c.parent_id).bind(c.kind.as_str())
            .bind(c.active).bind(c.display_order).bind(c.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::CategoryNotFound); }
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY display_order, name")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_product(&self, p: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, name, slug, sku, description, price, sale_price, category_id, stock_quantity, low_stock_threshold, featured, active, image, weight, created_at, updated_at, deleted_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)")
            .bind(p.id).bind(&p.name).bind(&p.slug).bind(p.sku.as_str()).bind(&p.description).bind(p.price)
            .bind(p.sale_price).bind(p.category_id).bind(p.stock_quantity).bind(p.low_stock_threshold)
            .bind(p.featured).bind(p.active).bind(&p.image).bind(p.weight).bind(p.created_at).bind(p.updated_at)
            .bind(p.deleted_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> Result<()> {
        let done = sqlx::query("UPDATE products SET name = $2, slug = $3, sku = $4, description = $5, price = $6, sale_price = $7, category_id = $8, low_stock_threshold = $9, featured = $10, active = $11, image = $12, weight = $13, updated_at = $14, deleted_at = $15 WHERE id = $1")
            .bind(p.id).bind(&p.name).bind(&p.slug).bind(p.sku.as_str()).bind(&p.description).bind(p.price)
            .bind(p.sale_price).bind(p.category_id).bind(p.low_stock_threshold).bind(p.featured).bind(p.active)
            .bind(&p.image).bind(p.weight).bind(p.updated_at).bind(p.deleted_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::ProductNotFound); }
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1")
            .bind(slug).fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE sku = $1")
            .bind(sku).fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_service(&self, s: &Service) -> Result<()> {
        sqlx::query("INSERT INTO services (id, name, slug, description, price, sale_price, duration_minutes, category_id, featured, active, image, created_at, updated_at, deleted_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)")
            .bind(s.id).bind(&s.name).bind(&s.slug).bind(&s.description).bind(s.price).bind(s.sale_price)
            .bind(s.duration_minutes).bind(s.category_id).bind(s.featured).bind(s.active).bind(&s.image)
            .bind(s.created_at).bind(s.updated_at).bind(s.deleted_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_service(&self, s: &Service) -> Result<()> {
        let done = sqlx::query("UPDATE services SET name = $2, slug = $3, description = $4, price = $5, sale_price = $6, duration_minutes = $7, category_id = $8, featured = $9, active = $10, image = $11, updated_at = $12, deleted_at = $13 WHERE id = $1")
            .bind(s.id).bind(&s.name).bind(&s.slug).bind(&s.description).bind(s.price).bind(s.sale_price)
            .bind(s.duration_minutes).bind(s.category_id).bind(s.featured).bind(s.active).bind(&s.image)
            .bind(s.updated_at).bind(s.deleted_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::ServiceNotFound); }
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>> {
        Ok(sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Service::from))
    }

    async fn get_service_by_slug(&self, slug: &str) -> Result<Option<Service>> {
        Ok(sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE slug = $1")
            .bind(slug).fetch_optional(&self.pool).await?.map(Service::from))
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Service::from).collect())
    }

    async fn insert_user(&self, u: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, name, email, phone, address, city, state, zip_code, role, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(u.id).bind(&u.name).bind(&u.email).bind(&u.phone).bind(&u.address).bind(&u.city).bind(&u.state)
            .bind(&u.zip_code).bind(u.role.as_str()).bind(u.active).bind(u.created_at).bind(u.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_user(&self, u: &User) -> Result<()> {
        let done = sqlx::query("UPDATE users SET name = $2, email = $3, phone = $4, address = $5, city = $6, state = $7, zip_code = $8, role = $9, active = $10, updated_at = $11 WHERE id = $1")
            .bind(u.id).bind(&u.name).bind(&u.email).bind(&u.phone).bind(&u.address).bind(&u.city).bind(&u.state)
            .bind(&u.zip_code).bind(u.role.as_str()).bind(u.active).bind(u.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::CustomerNotFound); }
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(User::try_from).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase()).fetch_optional(&self.pool).await?.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn load_cart(&self, customer_id: Uuid) -> Result<Cart> {
        let rows = sqlx::query_as::<_, CartRow>("SELECT id, item_type, item_id, quantity, created_at FROM cart_items WHERE user_id = $1 ORDER BY created_at")
            .bind(customer_id).fetch_all(&self.pool).await?;
        let lines = rows
            .into_iter()
            .map(|r| {
                Ok(CartLine {
                    id: r.id,
                    item: item_ref(&r.item_type, r.item_id)?,
                    quantity: qty_from_db(r.quantity)?,
                    added_at: r.created_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Cart::from_lines(customer_id, lines))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(cart.customer_id()).execute(&mut *tx).await?;
        for line in cart.lines() {
            sqlx::query("INSERT INTO cart_items (id, user_id, item_type, item_id, quantity, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(line.id).bind(cart.customer_id()).bind(line.item.kind.as_str()).bind(line.item.id)
                .bind(qty_to_db(line.quantity)).bind(line.added_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order, moves: &[StockMove]) -> Result<Vec<StockChange>> {
        self.write_order(order, None, moves).await
    }

    async fn save_order(&self, order: &Order, expected: OrderVersion, moves: &[StockMove]) -> Result<Vec<StockChange>> {
        self.write_order(order, Some(expected), moves).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.attach_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(from) = filter.from {
            query.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND created_at <= ").push_bind(to);
        }
        if let Some(q) = filter.query.as_deref() {
            let pattern = format!("%{}%", q.to_lowercase());
            query
                .push(" AND (LOWER(order_number) LIKE ").push_bind(pattern.clone())
                .push(" OR LOWER(customer_email) LIKE ").push_bind(pattern.clone())
                .push(" OR LOWER(customer_name) LIKE ").push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        let rows = query.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;
        self.attach_items(rows).await
    }

    async fn insert_payment(&self, p: &Payment) -> Result<()> {
        sqlx::query("INSERT INTO payments (id, order_id, method, status, amount, gateway, transaction_id, boleto_url, boleto_barcode, pix_qr_code, expires_at, card_last_four, card_brand, gateway_response, paid_at, refunded_at, refunded_amount, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)")
            .bind(p.id).bind(p.order_id).bind(p.method.as_str()).bind(p.status.as_str()).bind(p.amount)
            .bind(&p.gateway).bind(&p.transaction_id).bind(&p.boleto_url).bind(&p.boleto_barcode)
            .bind(&p.pix_qr_code).bind(p.expires_at).bind(&p.card_last_four).bind(&p.card_brand)
            .bind(&p.gateway_response).bind(p.paid_at).bind(p.refunded_at).bind(p.refunded_amount)
            .bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_payment(&self, p: &Payment) -> Result<()> {
        let done = sqlx::query("UPDATE payments SET status = $2, transaction_id = $3, boleto_url = $4, boleto_barcode = $5, pix_qr_code = $6, expires_at = $7, card_last_four = $8, card_brand = $9, gateway_response = $10, paid_at = $11, refunded_at = $12, refunded_amount = $13, updated_at = $14 WHERE id = $1")
            .bind(p.id).bind(p.status.as_str()).bind(&p.transaction_id).bind(&p.boleto_url).bind(&p.boleto_barcode)
            .bind(&p.pix_qr_code).bind(p.expires_at).bind(&p.card_last_four).bind(&p.card_brand)
            .bind(&p.gateway_response).bind(p.paid_at).bind(p.refunded_at).bind(p.refunded_amount)
            .bind(p.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::PaymentNotFound); }
        Ok(())
    }

    async fn payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1")
            .bind(order_id).fetch_optional(&self.pool).await?.map(Payment::try_from).transpose()
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE transaction_id = $1")
            .bind(transaction_id).fetch_optional(&self.pool).await?.map(Payment::try_from).transpose()
    }

    async fn adjust_stock(
        &self,
        product_id: Uuid,
        adjustment: Adjustment,
        kind: InventoryChangeKind,
        reason: Option<String>,
        user_id: Option<String>,
    ) -> Result<(StockChange, bool)> {
        let mut tx = self.pool.begin().await?;
        let (previous, threshold): (i32, i32) = sqlx::query_as("SELECT stock_quantity, low_stock_threshold FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id).fetch_optional(&mut *tx).await?.ok_or(EcommerceError::ProductNotFound)?;
        let adjusted = adjustment.apply(previous)?;
        sqlx::query("UPDATE products SET stock_quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id).bind(adjusted.new_stock).execute(&mut *tx).await?;
        let change = StockChange { product_id, previous, current: adjusted.new_stock, threshold };
        insert_log(&mut tx, &InventoryLog::record(&change, kind, reason).by_user(user_id)).await?;
        tx.commit().await?;
        Ok((change, adjusted.clamped))
    }

    async fn record_inventory_log(&self, log: &InventoryLog) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_log(&mut conn, log).await
    }

    async fn inventory_logs(&self, product_id: Uuid, limit: usize) -> Result<Vec<InventoryLog>> {
        let rows = sqlx::query_as::<_, InventoryLogRow>("SELECT * FROM inventory_logs WHERE product_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2")
            .bind(product_id).bind(i64::try_from(limit).unwrap_or(i64::MAX)).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_review(&self, r: &Review) -> Result<()> {
        sqlx::query("INSERT INTO reviews (id, user_id, item_type, item_id, rating, title, comment, status, verified_purchase, admin_response, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(r.id).bind(r.user_id).bind(r.target.kind.as_str()).bind(r.target.id).bind(i16::from(r.rating.value()))
            .bind(&r.title).bind(&r.comment).bind(r.status.as_str()).bind(r.verified_purchase).bind(&r.admin_response)
            .bind(r.created_at).bind(r.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_review(&self, r: &Review) -> Result<()> {
        let done = sqlx::query("UPDATE reviews SET rating = $2, title = $3, comment = $4, status = $5, verified_purchase = $6, admin_response = $7, updated_at = $8 WHERE id = $1")
            .bind(r.id).bind(i16::from(r.rating.value())).bind(&r.title).bind(&r.comment).bind(r.status.as_str())
            .bind(r.verified_purchase).bind(&r.admin_response).bind(r.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::ReviewNotFound); }
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> Result<()> {
        let done = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(id).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::ReviewNotFound); }
        Ok(())
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>> {
        sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Review::try_from).transpose()
    }

    async fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM reviews WHERE TRUE");
        if let Some(target) = filter.target {
            query.push(" AND item_type = ").push_bind(target.kind.as_str());
            query.push(" AND item_id = ").push_bind(target.id);
        }
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        let rows = query.build_query_as::<ReviewRow>().fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_appointment(&self, a: &Appointment) -> Result<()> {
        sqlx::query("INSERT INTO appointments (id, user_id, esthetician_id, service_id, scheduled_at, duration_minutes, status, notes, is_paid, order_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(a.id).bind(a.user_id).bind(a.esthetician_id).bind(a.service_id).bind(a.scheduled_at)
            .bind(a.duration_minutes).bind(a.status.as_str()).bind(&a.notes).bind(a.is_paid).bind(a.order_id)
            .bind(a.created_at).bind(a.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_appointment(&self, a: &Appointment) -> Result<()> {
        let done = sqlx::query("UPDATE appointments SET scheduled_at = $2, duration_minutes = $3, status = $4, notes = $5, is_paid = $6, order_id = $7, updated_at = $8 WHERE id = $1")
            .bind(a.id).bind(a.scheduled_at).bind(a.duration_minutes).bind(a.status.as_str()).bind(&a.notes)
            .bind(a.is_paid).bind(a.order_id).bind(a.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::AppointmentNotFound); }
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Appointment::try_from).transpose()
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM appointments WHERE TRUE");
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(esthetician_id) = filter.esthetician_id {
            query.push(" AND esthetician_id = ").push_bind(esthetician_id);
        }
        if let Some(from) = filter.from {
            query.push(" AND scheduled_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND scheduled_at < ").push_bind(to);
        }
        query.push(" ORDER BY scheduled_at, id");
        let rows = query.build_query_as::<AppointmentRow>().fetch_all(&self.pool).await?;
        convert(rows)
    }
}
