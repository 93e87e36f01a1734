use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, Payment, Transition, User};
use crate::domain::value_objects::Money;
use crate::error::{EcommerceError, Result};
use crate::services::customers::finish_csv;
use crate::services::events::EventPublisher;
use crate::services::payments::PaymentService;
use crate::store::{OrderFilter, Page, Store, ORDER_SAVE_ATTEMPTS};

pub const ADMIN_PER_PAGE: u32 = 15;

#[derive(Debug, Default, Deserialize)]
pub struct OrderSearch {
    pub status: Option<OrderStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub q: Option<String>,
    pub page: Option<u32>,
}

impl OrderSearch {
    fn filter(&self) -> OrderFilter {
        OrderFilter {
            status: self.status,
            user_id: None,
            from: self.date_from.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|d| d.and_utc()),
            to: self.date_to.and_then(|d| d.and_hms_opt(23, 59, 59)).map(|d| d.and_utc()),
            query: self.q.clone().filter(|q| !q.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub payment: Option<Payment>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    payments: PaymentService,
    events: EventPublisher,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, payments: PaymentService, events: EventPublisher) -> Self {
        Self { store, payments, events }
    }

    async fn get(&self, id: Uuid) -> Result<Order> {
        self.store.get_order(id).await?.ok_or(EcommerceError::OrderNotFound)
    }

    /// Other customers' orders are reported as missing.
    async fn owned(&self, customer: &User, id: Uuid) -> Result<Order> {
        let order = self.get(id).await?;
        if order.user_id != customer.id {
            return Err(EcommerceError::OrderNotFound);
        }
        Ok(order)
    }

    pub async fn mine(&self, customer: &User, page: u32) -> Result<Page<Order>> {
        let orders = self.store.list_orders(&OrderFilter::for_user(customer.id)).await?;
        Ok(Page::slice(orders, page, 10))
    }

    pub async fn detail_for(&self, customer: &User, id: Uuid) -> Result<OrderDetail> {
        let order = self.owned(customer, id).await?;
        let payment = self.payments.for_order(order.id).await?;
        Ok(OrderDetail { order, payment })
    }

    /// Polls the gateway while the order is still waiting for payment.
    pub async fn payment_status(&self, customer: &User, id: Uuid) -> Result<OrderDetail> {
        let order = self.owned(customer, id).await?;
        let payment = self.payments.refresh_status(&order).await?;
        let order = self.get(id).await?;
        Ok(OrderDetail { order, payment })
    }

    #[instrument(skip(self, customer), fields(user_id = %customer.id))]
    pub async fn cancel_for(&self, customer: &User, id: Uuid) -> Result<Order> {
        let order = self.owned(customer, id).await?;
        self.cancel_order(order, true).await
    }

    /// Cancels the order, recomputing from the stored order when another
    /// request moved it first.
    async fn cancel_order(&self, mut order: Order, by_customer: bool) -> Result<Order> {
        let mut attempt = 1;
        loop {
            if by_customer && !order.customer_can_cancel() {
                return Err(EcommerceError::InvalidTransition { from: order.status, to: OrderStatus::Canceled });
            }
            match self.apply(&mut order, OrderStatus::Canceled).await {
                Ok(_) => break,
                Err(EcommerceError::OrderChanged) if attempt < ORDER_SAVE_ATTEMPTS => {
                    warn!(order_id = %order.id, attempt, "order changed while canceling, retrying");
                    attempt += 1;
                    order = self.get(order.id).await?;
                }
                Err(e) => return Err(e),
            }
        }
        self.payments.cancel_pending(order.id).await?;
        info!(order_id = %order.id, "order canceled");
        Ok(order)
    }

    /// Moves the order, persisting the status and any stock release together.
    async fn apply(&self, order: &mut Order, next: OrderStatus) -> Result<Transition> {
        let expected = order.version();
        let transition = order.transition_to(next)?;
        if transition != Transition::Unchanged {
            let moves = if transition.releases_stock() { order.release_moves() } else { vec![] };
            let changes = self.store.save_order(order, expected, &moves).await?;
            self.events.stock_changes(&changes).await;
            self.events.publish_all(order.take_events()).await;
        }
        Ok(transition)
    }

    pub async fn admin_list(&self, search: &OrderSearch) -> Result<Page<Order>> {
        let orders = self.store.list_orders(&search.filter()).await?;
        Ok(Page::slice(orders, search.page.unwrap_or(1), ADMIN_PER_PAGE))
    }

    pub async fn admin_detail(&self, id: Uuid) -> Result<OrderDetail> {
        let order = self.get(id).await?;
        let payment = self.payments.for_order(id).await?;
        Ok(OrderDetail { order, payment })
    }

    #[instrument(skip(self, update), fields(to = %update.status))]
    pub async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<Order> {
        if !matches!(
            update.status,
            OrderStatus::Pending
                | OrderStatus::Processing
                | OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::Canceled
        ) {
            return Err(EcommerceError::Validation(format!("status {} is set by the payment gateway", update.status)));
        }
        let mut order = self.get(id).await?;
        if update.status == OrderStatus::Canceled {
            return self.cancel_order(order, false).await;
        }
        let expected = order.version();
        if update.status == OrderStatus::Processing && order.status == OrderStatus::Pending {
            order.mark_paid()?;
        } else {
            order.transition_to(update.status)?;
        }
        if update.status == OrderStatus::Shipped {
            if let Some(tracking) = update.tracking_number.filter(|t| !t.trim().is_empty()) {
                order.tracking_number = Some(tracking.trim().to_string());
            }
        }
        // None of these targets releases stock. Tracking can change without a status change.
        self.store.save_order(&order, expected, &[]).await?;
        self.events.publish_all(order.take_events()).await;
        info!(order_id = %id, status = %order.status, "order status updated");
        Ok(order)
    }

    pub async fn admin_cancel(&self, id: Uuid) -> Result<Order> {
        let order = self.get(id).await?;
        self.cancel_order(order, false).await
    }

    pub async fn export_csv(&self, search: &OrderSearch) -> Result<String> {
        let orders = self.store.list_orders(&search.filter()).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["order_number", "date", "customer", "email", "status", "payment_status", "payment_method", "items", "total"])?;
        for order in &orders {
            writer.write_record([
                order.order_number.as_str(),
                &format_date(order.created_at),
                order.customer_name.as_str(),
                order.customer_email.as_str(),
                order.status.as_str(),
                order.payment_status.as_str(),
                order.payment_method.as_str(),
                &order.items.iter().map(|i| i.quantity).sum::<u32>().to_string(),
                &Money::brl(order.total).format(),
            ])?;
        }
        finish_csv(writer)
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y %H:%M").to_string()
}
