//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::customer::User;
use crate::domain::aggregates::inventory::StockMove;
use crate::domain::aggregates::payment::PaymentMethod;
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{ItemRef, Money};
use crate::error::{EcommerceError, Result};

string_enum! {
    pub enum OrderStatus {
        Pending => "pending",
        Processing => "processing",
        Shipped => "shipped",
        Delivered => "delivered",
        Canceled => "canceled",
        PaymentFailed => "payment_failed",
        Refunded => "refunded",
        Chargeback => "chargeback",
    }
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Canceled | PaymentFailed)
                | (PaymentFailed, Canceled)
                | (Processing, Shipped | Canceled | Refunded | Chargeback)
                | (Shipped, Delivered | Refunded | Chargeback)
                | (Delivered, Refunded | Chargeback)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Refunded | OrderStatus::Chargeback)
    }

    /// Orders in these states count towards revenue.
    pub fn is_revenue(&self) -> bool {
        matches!(self, OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered)
    }

    /// Entering this state gives reserved stock back.
    pub fn releases_stock(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::PaymentFailed)
    }
}

string_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
        Refunded => "refunded",
        Chargeback => "chargeback",
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 255))]
    pub street: String,
    #[validate(length(min = 1, max = 20))]
    pub number: String,
    #[validate(length(max = 255))]
    pub complement: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub neighborhood: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(equal = 2))]
    pub state: String,
    #[validate(length(min = 8, max = 9))]
    pub zip_code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub item: ItemRef,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl OrderItem {
    /// Snapshots the item's name and price at the time of purchase.
    pub fn snapshot(item: ItemRef, name: impl Into<String>, sku: Option<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(),
            item,
            name: name.into(),
            sku,
            quantity,
            unit_price,
            total: Money::brl(unit_price).multiply(quantity).amount(),
        }
    }
}

/// Result of asking an order to change status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Changed { from: OrderStatus, to: OrderStatus, release_stock: bool },
}

impl Transition {
    pub fn releases_stock(&self) -> bool {
        matches!(self, Transition::Changed { release_stock: true, .. })
    }
}

/// The stored state a change was computed from. Saves against a version the
/// stored order no longer has fail with `OrderChanged`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderVersion {
    pub status: OrderStatus,
    pub stock_reserved: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub shipping_address: Address,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub stock_reserved: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Order {
    /// Builds a pending order. Shipping applies only when a physical product is bought.
    pub fn place(
        customer: &User,
        shipping_address: Address,
        payment_method: PaymentMethod,
        items: Vec<OrderItem>,
        shipping_fee: Decimal,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(EcommerceError::CartEmpty);
        }
        let now = Utc::now();
        let subtotal = items
            .iter()
            .fold(Money::zero("BRL"), |acc, i| acc.add(&Money::brl(i.total)).unwrap_or(acc))
            .amount();
        let shipping = if items.iter().any(|i| i.item.product_id().is_some()) {
            shipping_fee
        } else {
            Decimal::ZERO
        };
        let (tax, discount) = (Decimal::ZERO, Decimal::ZERO);
        let mut order = Self {
            id: Uuid::now_v7(),
            order_number: Self::generate_number(now),
            user_id: customer.id,
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method,
            items,
            subtotal,
            shipping,
            tax,
            discount,
            total: subtotal + shipping + tax - discount,
            shipping_address,
            tracking_number: None,
            notes: None,
            stock_reserved: false,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        order.raise_event(DomainEvent::OrderPlaced {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            total: order.total,
        });
        Ok(order)
    }

    pub fn version(&self) -> OrderVersion {
        OrderVersion { status: self.status, stock_reserved: self.stock_reserved }
    }

    /// `ORD-YYYYMMDD-XXXXXXXX`
    pub fn generate_number(at: DateTime<Utc>) -> String {
        format!("ORD-{}-{:08X}", at.format("%Y%m%d"), rand::random::<u32>())
    }

    /// Stock taken from each product line when the order is placed.
    pub fn reservation_moves(&self) -> Vec<StockMove> {
        self.items
            .iter()
            .filter_map(|i| i.item.product_id().map(|id| StockMove::reserve(id, i.quantity)))
            .collect()
    }

    pub fn release_moves(&self) -> Vec<StockMove> {
        self.items
            .iter()
            .filter_map(|i| i.item.product_id().map(|id| StockMove::release(id, i.quantity)))
            .collect()
    }

    pub fn contains(&self, item: ItemRef) -> bool {
        self.items.iter().any(|i| i.item == item)
    }

    pub fn has_physical_items(&self) -> bool {
        self.items.iter().any(|i| i.item.product_id().is_some())
    }

    pub fn customer_can_cancel(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::PaymentFailed)
    }

    pub fn awaiting_payment(&self) -> bool {
        self.status == OrderStatus::Pending && self.payment_status == PaymentStatus::Pending
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<Transition> {
        let from = self.status;
        if from == next {
            return Ok(Transition::Unchanged);
        }
        if !from.can_transition_to(next) {
            return Err(EcommerceError::InvalidTransition { from, to: next });
        }

        let now = Utc::now();
        match next {
            OrderStatus::Shipped => self.shipped_at = Some(now),
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Canceled => self.canceled_at = Some(now),
            OrderStatus::PaymentFailed => self.payment_status = PaymentStatus::Failed,
            OrderStatus::Refunded => self.payment_status = PaymentStatus::Refunded,
            OrderStatus::Chargeback => self.payment_status = PaymentStatus::Chargeback,
            OrderStatus::Pending | OrderStatus::Processing => {}
        }

        let release_stock = next.releases_stock() && self.stock_reserved;
        if release_stock {
            self.stock_reserved = false;
        }
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::OrderStatusChanged { order_id: self.id, from, to: next });
        Ok(Transition::Changed { from, to: next, release_stock })
    }

    /// Payment confirmed: a pending order starts processing.
    pub fn mark_paid(&mut self) -> Result<Transition> {
        match self.status {
            OrderStatus::Pending => {
                self.record_payment();
                self.transition_to(OrderStatus::Processing)
            }
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered => {
                if self.payment_status != PaymentStatus::Paid {
                    self.record_payment();
                    self.touch();
                }
                Ok(Transition::Unchanged)
            }
            from => Err(EcommerceError::InvalidTransition { from, to: OrderStatus::Processing }),
        }
    }

    fn record_payment(&mut self) {
        self.payment_status = PaymentStatus::Paid;
        self.paid_at = Some(Utc::now());
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::customer::Role;

    fn address() -> Address {
        Address {
            street: "Rua das Flores".into(),
            number: "120".into(),
            complement: None,
            neighborhood: "Centro".into(),
            city: "Curitiba".into(),
            state: "PR".into(),
            zip_code: "80010000".into(),
        }
    }

    fn order_with(items: Vec<OrderItem>) -> Order {
        let customer = User::register("Ana", "ana@example.com", Role::Customer);
        Order::place(&customer, address(), PaymentMethod::Pix, items, Decimal::new(1500, 2)).unwrap()
    }

    fn cream(qty: u32) -> OrderItem {
        OrderItem::snapshot(ItemRef::product(Uuid::now_v7()), "Creme", Some("CRM-1".into()), qty, Decimal::new(4990, 2))
    }

    #[test]
    fn test_status_strings_parse() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), *status);
        }
        assert_eq!("payment_failed".parse::<OrderStatus>().unwrap(), OrderStatus::PaymentFailed);
        assert!(matches!("lost".parse::<OrderStatus>(), Err(EcommerceError::Validation(_))));
        assert_eq!("paid".parse::<PaymentStatus>().unwrap(), PaymentStatus::Paid);
    }

    #[test]
    fn test_order_totals() {
        let order = order_with(vec![cream(2)]);
        assert_eq!(order.subtotal, Decimal::new(9980, 2));
        assert_eq!(order.shipping, Decimal::new(1500, 2));
        assert_eq!(order.total, Decimal::new(11480, 2));
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.order_number.len(), "ORD-20240101-ABCDEF12".len());
    }

    #[test]
    fn test_service_only_order_has_no_shipping() {
        let facial = OrderItem::snapshot(ItemRef::service(Uuid::now_v7()), "Facial", None, 1, Decimal::new(200, 0));
        let order = order_with(vec![facial]);
        assert_eq!(order.shipping, Decimal::ZERO);
        assert_eq!(order.total, Decimal::new(200, 0));
        assert!(order.reservation_moves().is_empty());
    }

    #[test]
    fn test_empty_order_rejected() {
        let customer = User::register("Ana", "ana@example.com", Role::Customer);
        let err = Order::place(&customer, address(), PaymentMethod::Pix, vec![], Decimal::ZERO).unwrap_err();
        assert!(matches!(err, EcommerceError::CartEmpty));
    }

    #[test]
    fn test_order_workflow() {
        let mut order = order_with(vec![cream(1)]);
        order.stock_reserved = true;
        assert!(matches!(order.mark_paid().unwrap(), Transition::Changed { to: OrderStatus::Processing, .. }));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        order.transition_to(OrderStatus::Shipped).unwrap();
        assert!(order.shipped_at.is_some());
        order.transition_to(OrderStatus::Delivered).unwrap();
        assert!(order.delivered_at.is_some());
        assert!(order.transition_to(OrderStatus::Canceled).is_err());
        let refund = order.transition_to(OrderStatus::Refunded).unwrap();
        assert!(!refund.releases_stock());
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_cancel_releases_reserved_stock_once() {
        let mut order = order_with(vec![cream(3)]);
        order.stock_reserved = true;
        let failed = order.transition_to(OrderStatus::PaymentFailed).unwrap();
        assert!(failed.releases_stock());
        assert_eq!(order.payment_status, PaymentStatus::Failed);
        let canceled = order.transition_to(OrderStatus::Canceled).unwrap();
        assert!(!canceled.releases_stock());
        assert_eq!(order.transition_to(OrderStatus::Canceled).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(PaymentFailed));
        assert!(PaymentFailed.can_transition_to(Canceled));
        assert!(!PaymentFailed.can_transition_to(Processing));
        assert!(!Shipped.can_transition_to(Canceled));
        assert!(Delivered.can_transition_to(Chargeback));
        for terminal in [Canceled, Refunded, Chargeback] {
            assert!(OrderStatus::ALL.iter().all(|next| !terminal.can_transition_to(*next)));
        }
    }

    #[test]
    fn test_mark_paid_after_failure_is_rejected() {
        let mut order = order_with(vec![cream(1)]);
        order.transition_to(OrderStatus::PaymentFailed).unwrap();
        assert!(matches!(order.mark_paid(), Err(EcommerceError::InvalidTransition { .. })));
        assert_eq!(order.payment_status, PaymentStatus::Failed);
    }

    #[test]
    fn test_events_raised() {
        let mut order = order_with(vec![cream(1)]);
        order.transition_to(OrderStatus::Canceled).unwrap();
        let events = order.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DomainEvent::OrderPlaced { .. }));
        assert!(matches!(events[1], DomainEvent::OrderStatusChanged { to: OrderStatus::Canceled, .. }));
        assert!(order.take_events().is_empty());
    }
}
