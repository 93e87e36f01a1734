//! In-process store for development and tests. One lock guards every table so
//! multi-table writes are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AppointmentFilter, OrderFilter, ReviewFilter, Store};
use crate::domain::aggregates::{
    Adjustment, Appointment, Cart, CartLine, Category, InventoryChangeKind, InventoryLog, Order, OrderVersion, Payment,
    Product, Review, Service, StockChange, StockMove, User,
};
use crate::error::{EcommerceError, Result};

#[derive(Default)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    services: HashMap<Uuid, Service>,
    users: HashMap<Uuid, User>,
    carts: HashMap<Uuid, Vec<CartLine>>,
    orders: HashMap<Uuid, Order>,
    payments: Vec<Payment>,
    inventory_logs: Vec<InventoryLog>,
    reviews: HashMap<Uuid, Review>,
    appointments: HashMap<Uuid, Appointment>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflict(what: &str) -> EcommerceError {
    EcommerceError::Conflict(format!("{what} already exists"))
}

impl Tables {
    fn check_product_unique(&self, product: &Product) -> Result<()> {
        for other in self.products.values().filter(|p| p.id != product.id) {
            if other.slug == product.slug {
                return Err(conflict("product slug"));
            }
            if other.sku == product.sku {
                return Err(conflict("product sku"));
            }
        }
        Ok(())
    }

    fn check_service_unique(&self, service: &Service) -> Result<()> {
        if self.services.values().any(|s| s.id != service.id && s.slug == service.slug) {
            return Err(conflict("service slug"));
        }
        Ok(())
    }

    fn check_category_unique(&self, category: &Category) -> Result<()> {
        if self.categories.values().any(|c| c.id != category.id && c.slug == category.slug) {
            return Err(conflict("category slug"));
        }
        Ok(())
    }

    fn check_user_unique(&self, user: &User) -> Result<()> {
        if self.users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(conflict("email"));
        }
        Ok(())
    }

    /// Validates every move before touching any stock.
    fn apply_moves(&mut self, moves: &[StockMove], order_id: Uuid, reason: &str) -> Result<Vec<StockChange>> {
        let mut staged: HashMap<Uuid, i32> = HashMap::new();
        let mut changes = Vec::with_capacity(moves.len());
        for m in moves {
            let product = self.products.get(&m.product_id).ok_or(EcommerceError::ProductNotFound)?;
            let previous = staged.get(&m.product_id).copied().unwrap_or(product.stock_quantity);
            let current = previous + m.delta;
            if current < 0 {
                return Err(EcommerceError::InsufficientStock {
                    product_id: m.product_id,
                    requested: m.delta.unsigned_abs(),
                    available: previous,
                });
            }
            staged.insert(m.product_id, current);
            changes.push(StockChange {
                product_id: m.product_id,
                previous,
                current,
                threshold: product.low_stock_threshold,
            });
        }

        for (change, m) in changes.iter().zip(moves) {
            if let Some(product) = self.products.get_mut(&change.product_id) {
                product.stock_quantity = change.current;
            }
            self.inventory_logs
                .push(InventoryLog::record(change, m.kind, Some(reason.to_string())).for_order(order_id));
        }
        Ok(changes)
    }
}

fn newest_first<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut t = self.tables.write().await;
        t.check_category_unique(category)?;
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.categories.contains_key(&category.id) {
            return Err(EcommerceError::CategoryNotFound);
        }
        t.check_category_unique(category)?;
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let t = self.tables.read().await;
        let mut categories: Vec<Category> = t.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.display_order.cmp(&b.display_order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write().await;
        t.check_product_unique(product)?;
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write().await;
        t.check_product_unique(product)?;
        let existing = t.products.get_mut(&product.id).ok_or(EcommerceError::ProductNotFound)?;
        let stock = existing.stock_quantity;
        *existing = product.clone();
        existing.stock_quantity = stock;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let t = self.tables.read().await;
        Ok(t.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let t = self.tables.read().await;
        Ok(t.products.values().find(|p| p.sku.as_str() == sku).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let t = self.tables.read().await;
        let live = t.products.values().filter(|p| p.deleted_at.is_none()).cloned().collect();
        Ok(newest_first(live, |p: &Product| (p.created_at, p.id)))
    }

    async fn insert_service(&self, service: &Service) -> Result<()> {
        let mut t = self.tables.write().await;
        t.check_service_unique(service)?;
        t.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.services.contains_key(&service.id) {
            return Err(EcommerceError::ServiceNotFound);
        }
        t.check_service_unique(service)?;
        t.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn get_service_by_slug(&self, slug: &str) -> Result<Option<Service>> {
        let t = self.tables.read().await;
        Ok(t.services.values().find(|s| s.slug == slug).cloned())
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        let t = self.tables.read().await;
        let live = t.services.values().filter(|s| s.deleted_at.is_none()).cloned().collect();
        Ok(newest_first(live, |s: &Service| (s.created_at, s.id)))
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write().await;
        t.check_user_unique(user)?;
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user.id) {
            return Err(EcommerceError::CustomerNotFound);
        }
        t.check_user_unique(user)?;
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let t = self.tables.read().await;
        let users = t.users.values().cloned().collect();
        Ok(newest_first(users, |u: &User| (u.created_at, u.id)))
    }

    async fn load_cart(&self, customer_id: Uuid) -> Result<Cart> {
        let t = self.tables.read().await;
        let lines = t.carts.get(&customer_id).cloned().unwrap_or_default();
        Ok(Cart::from_lines(customer_id, lines))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut t = self.tables.write().await;
        if cart.is_empty() {
            t.carts.remove(&cart.customer_id());
        } else {
            t.carts.insert(cart.customer_id(), cart.lines().to_vec());
        }
        Ok(())
    }

    async fn insert_order(&self, order: &Order, moves: &[StockMove]) -> Result<Vec<StockChange>> {
        let mut t = self.tables.write().await;
        if t.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(conflict("order number"));
        }
        let changes = t.apply_moves(moves, order.id, &format!("order {}", order.order_number))?;
        t.orders.insert(order.id, order.clone());
        Ok(changes)
    }

    async fn save_order(&self, order: &Order, expected: OrderVersion, moves: &[StockMove]) -> Result<Vec<StockChange>> {
        let mut t = self.tables.write().await;
        let stored = t.orders.get(&order.id).ok_or(EcommerceError::OrderNotFound)?;
        if stored.version() != expected {
            return Err(EcommerceError::OrderChanged);
        }
        let changes = t.apply_moves(moves, order.id, &format!("order {}", order.order_number))?;
        t.orders.insert(order.id, order.clone());
        Ok(changes)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let t = self.tables.read().await;
        let orders = t.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        Ok(newest_first(orders, |o: &Order| (o.created_at, o.id)))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(tx) = &payment.transaction_id {
            if t.payments.iter().any(|p| p.transaction_id.as_ref() == Some(tx)) {
                return Err(conflict("transaction"));
            }
        }
        t.payments.push(payment.clone());
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let mut t = self.tables.write().await;
        let existing = t
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or(EcommerceError::PaymentNotFound)?;
        *existing = payment.clone();
        Ok(())
    }

    async fn payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        let t = self.tables.read().await;
        Ok(t.payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .max_by_key(|p| (p.created_at, p.id))
            .cloned())
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>> {
        let t = self.tables.read().await;
        Ok(t.payments
            .iter()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn adjust_stock(
        &self,
        product_id: Uuid,
        adjustment: Adjustment,
        kind: InventoryChangeKind,
        reason: Option<String>,
        user_id: Option<String>,
    ) -> Result<(StockChange, bool)> {
        let mut t = self.tables.write().await;
        let product = t.products.get_mut(&product_id).ok_or(EcommerceError::ProductNotFound)?;
        let adjusted = adjustment.apply(product.stock_quantity)?;
        let change = StockChange {
            product_id,
            previous: product.stock_quantity,
            current: adjusted.new_stock,
            threshold: product.low_stock_threshold,
        };
        product.stock_quantity = adjusted.new_stock;
        product.touch();
        t.inventory_logs
            .push(InventoryLog::record(&change, kind, reason).by_user(user_id));
        Ok((change, adjusted.clamped))
    }

    async fn record_inventory_log(&self, log: &InventoryLog) -> Result<()> {
        self.tables.write().await.inventory_logs.push(log.clone());
        Ok(())
    }

    async fn inventory_logs(&self, product_id: Uuid, limit: usize) -> Result<Vec<InventoryLog>> {
        let t = self.tables.read().await;
        let logs = t.inventory_logs.iter().filter(|l| l.product_id == product_id).cloned().collect();
        let mut logs = newest_first(logs, |l: &InventoryLog| (l.created_at, l.id));
        logs.truncate(limit);
        Ok(logs)
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.reviews.values().any(|r| r.user_id == review.user_id && r.target == review.target) {
            return Err(conflict("review for this item"));
        }
        t.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn update_review(&self, review: &Review) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.reviews.contains_key(&review.id) {
            return Err(EcommerceError::ReviewNotFound);
        }
        t.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables.write().await;
        t.reviews.remove(&id).map(|_| ()).ok_or(EcommerceError::ReviewNotFound)
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>> {
        Ok(self.tables.read().await.reviews.get(&id).cloned())
    }

    async fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        let t = self.tables.read().await;
        let reviews = t.reviews.values().filter(|r| filter.matches(r)).cloned().collect();
        Ok(newest_first(reviews, |r: &Review| (r.created_at, r.id)))
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        let mut t = self.tables.write().await;
        t.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.appointments.contains_key(&appointment.id) {
            return Err(EcommerceError::AppointmentNotFound);
        }
        t.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        let t = self.tables.read().await;
        let mut appointments: Vec<Appointment> =
            t.appointments.values().filter(|a| filter.matches(a)).cloned().collect();
        appointments.sort_by_key(|a| (a.scheduled_at, a.id));
        Ok(appointments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, OrderItem, OrderStatus, PaymentMethod, Role};
    use crate::domain::value_objects::{ItemRef, Sku};
    use rust_decimal::Decimal;

    async fn stocked(store: &MemoryStore, sku: &str, stock: i32) -> Product {
        let mut product = Product::create(Sku::new(sku).unwrap(), sku, sku.to_lowercase(), Decimal::new(50, 0));
        product.stock_quantity = stock;
        store.insert_product(&product).await.unwrap();
        product
    }

    fn order_for(product: &Product, qty: u32) -> Order {
        let customer = User::register("Ana", "ana@example.com", Role::Customer);
        let item = OrderItem::snapshot(ItemRef::product(product.id), &product.name, None, qty, product.price);
        Order::place(&customer, Address::default(), PaymentMethod::Pix, vec![item], Decimal::ZERO).unwrap()
    }

    #[tokio::test]
    async fn test_reservation_is_all_or_nothing() {
        let store = MemoryStore::new();
        let a = stocked(&store, "A-1", 5).await;
        let b = stocked(&store, "B-1", 1).await;
        let order = order_for(&a, 2);
        let moves = [StockMove::reserve(a.id, 2), StockMove::reserve(b.id, 3)];

        let err = store.insert_order(&order, &moves).await.unwrap_err();
        assert!(matches!(err, EcommerceError::InsufficientStock { available: 1, requested: 3, .. }));
        assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 5);
        assert!(store.get_order(order.id).await.unwrap().is_none());
        assert!(store.inventory_logs(a.id, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reservation_logs_reference_order() {
        let store = MemoryStore::new();
        let a = stocked(&store, "A-2", 5).await;
        let order = order_for(&a, 2);
        let changes = store.insert_order(&order, &order.reservation_moves()).await.unwrap();
        assert_eq!(changes[0].current, 3);
        let logs = store.inventory_logs(a.id, 50).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, InventoryChangeKind::Reservation);
        assert_eq!(logs[0].order_id, Some(order.id));
    }

    #[tokio::test]
    async fn test_stale_order_copies_release_stock_once() {
        let store = MemoryStore::new();
        let a = stocked(&store, "A-4", 10).await;
        let mut order = order_for(&a, 4);
        order.stock_reserved = true;
        store.insert_order(&order, &order.reservation_moves()).await.unwrap();
        let read = order.version();

        let mut canceled = order.clone();
        canceled.transition_to(OrderStatus::Canceled).unwrap();
        store.save_order(&canceled, read, &canceled.release_moves()).await.unwrap();

        let mut failed = order.clone();
        assert!(failed.transition_to(OrderStatus::PaymentFailed).unwrap().releases_stock());
        let err = store.save_order(&failed, read, &failed.release_moves()).await.unwrap_err();
        assert!(matches!(err, EcommerceError::OrderChanged));

        assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_quantity, 10);
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Canceled);
        assert!(!stored.stock_reserved);
        let releases = store.inventory_logs(a.id, 50).await.unwrap();
        assert_eq!(releases.iter().filter(|l| l.kind == InventoryChangeKind::Release).count(), 1);
    }

    #[tokio::test]
    async fn test_update_product_keeps_stock() {
        let store = MemoryStore::new();
        let mut a = stocked(&store, "A-3", 9).await;
        a.stock_quantity = 0;
        a.name = "Renamed".into();
        store.update_product(&a).await.unwrap();
        let saved = store.get_product(a.id).await.unwrap().unwrap();
        assert_eq!(saved.stock_quantity, 9);
        assert_eq!(saved.name, "Renamed");
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = MemoryStore::new();
        stocked(&store, "DUP", 1).await;
        let clash = Product::create(Sku::new("dup").unwrap(), "Other", "other", Decimal::ONE);
        assert!(matches!(store.insert_product(&clash).await, Err(EcommerceError::Conflict(_))));

        store.insert_user(&User::register("A", "a@example.com", Role::Customer)).await.unwrap();
        let twin = User::register("B", "A@example.com", Role::Customer);
        assert!(matches!(store.insert_user(&twin).await, Err(EcommerceError::Conflict(_))));
    }
}
