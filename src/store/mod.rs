//! Persistence port and its two adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{
    Adjustment, Appointment, Cart, Category, InventoryChangeKind, InventoryLog, Order, OrderStatus, OrderVersion,
    Payment, Product, Review, ReviewStatus, Service, StockChange, StockMove, User,
};
use crate::domain::value_objects::ItemRef;
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// How many times a status change is recomputed after losing a race on the
/// same order.
pub const ORDER_SAVE_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive match on order number, customer email or name.
    pub query: Option<String>,
}

impl OrderFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), ..Self::default() }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from: Some(from), to: Some(to), ..Self::default() }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.user_id.map_or(true, |u| order.user_id == u)
            && self.from.map_or(true, |f| order.created_at >= f)
            && self.to.map_or(true, |t| order.created_at <= t)
            && self.query.as_deref().map_or(true, |q| {
                let q = q.to_lowercase();
                order.order_number.to_lowercase().contains(&q)
                    || order.customer_email.to_lowercase().contains(&q)
                    || order.customer_name.to_lowercase().contains(&q)
            })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReviewFilter {
    pub target: Option<ItemRef>,
    pub user_id: Option<Uuid>,
    pub status: Option<ReviewStatus>,
}

impl ReviewFilter {
    pub fn matches(&self, review: &Review) -> bool {
        self.target.map_or(true, |t| review.target == t)
            && self.user_id.map_or(true, |u| review.user_id == u)
            && self.status.map_or(true, |s| review.status == s)
    }
}

#[derive(Clone, Debug, Default)]
pub struct AppointmentFilter {
    pub user_id: Option<Uuid>,
    pub esthetician_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.user_id.map_or(true, |u| appointment.user_id == u)
            && self.esthetician_id.map_or(true, |e| appointment.esthetician_id == e)
            && self.from.map_or(true, |f| appointment.scheduled_at >= f)
            && self.to.map_or(true, |t| appointment.scheduled_at < t)
    }
}

/// One page of a listing.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: usize,
    pub last_page: u32,
}

impl<T> Page<T> {
    /// Cuts `page` (1-based) out of an already ordered listing.
    pub fn slice(items: Vec<T>, page: u32, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let total = items.len();
        let last_page = u32::try_from(total.div_ceil(per_page as usize)).unwrap_or(u32::MAX).max(1);
        let skip = (page as usize - 1).saturating_mul(per_page as usize);
        let data = items.into_iter().skip(skip).take(per_page as usize).collect();
        Self { data, current_page: page, per_page, total, last_page }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total: self.total,
            last_page: self.last_page,
        }
    }
}

/// Storage for every aggregate. Stock never changes outside the methods that
/// take [`StockMove`]s or an [`Adjustment`], and each of those writes inventory
/// log entries in the same unit of work.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_category(&self, category: &Category) -> Result<()>;
    async fn update_category(&self, category: &Category) -> Result<()>;
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Inserts a product including its opening stock.
    async fn insert_product(&self, product: &Product) -> Result<()>;
    /// Saves everything except `stock_quantity`.
    async fn update_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>>;
    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>>;
    /// All products that are not soft-deleted, newest first.
    async fn list_products(&self) -> Result<Vec<Product>>;

    async fn insert_service(&self, service: &Service) -> Result<()>;
    async fn update_service(&self, service: &Service) -> Result<()>;
    async fn get_service(&self, id: Uuid) -> Result<Option<Service>>;
    async fn get_service_by_slug(&self, slug: &str) -> Result<Option<Service>>;
    async fn list_services(&self) -> Result<Vec<Service>>;

    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn update_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn load_cart(&self, customer_id: Uuid) -> Result<Cart>;
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    /// Inserts the order and applies `moves` atomically. Fails with
    /// `InsufficientStock` when any move would take stock below zero.
    async fn insert_order(&self, order: &Order, moves: &[StockMove]) -> Result<Vec<StockChange>>;
    /// Saves order state and applies `moves` atomically, provided the stored
    /// order still has `expected`. Otherwise nothing is written and the call
    /// fails with `OrderChanged`.
    async fn save_order(&self, order: &Order, expected: OrderVersion, moves: &[StockMove]) -> Result<Vec<StockChange>>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    /// Matching orders, newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    async fn insert_payment(&self, payment: &Payment) -> Result<()>;
    async fn update_payment(&self, payment: &Payment) -> Result<()>;
    /// Latest payment attempt for the order.
    async fn payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>>;
    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>>;

    /// Applies a manual adjustment and logs it. The flag reports a subtraction clamped at zero.
    async fn adjust_stock(
        &self,
        product_id: Uuid,
        adjustment: Adjustment,
        kind: InventoryChangeKind,
        reason: Option<String>,
        user_id: Option<String>,
    ) -> Result<(StockChange, bool)>;
    async fn record_inventory_log(&self, log: &InventoryLog) -> Result<()>;
    /// Newest first.
    async fn inventory_logs(&self, product_id: Uuid, limit: usize) -> Result<Vec<InventoryLog>>;

    async fn insert_review(&self, review: &Review) -> Result<()>;
    async fn update_review(&self, review: &Review) -> Result<()>;
    async fn delete_review(&self, id: Uuid) -> Result<()>;
    async fn get_review(&self, id: Uuid) -> Result<Option<Review>>;
    /// Matching reviews, newest first.
    async fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>>;

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()>;
    async fn update_appointment(&self, appointment: &Appointment) -> Result<()>;
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>>;
    /// Matching appointments, earliest first.
    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>>;
}
