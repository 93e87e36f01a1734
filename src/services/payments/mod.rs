//! Payment records and the order side effects of gateway status changes.

pub mod gateway;
pub mod webhook;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    GatewayStatus, InventoryChangeKind, InventoryLog, Order, OrderStatus, OrderVersion, Payment, PaymentStatus,
    StockChange, Transition,
};
use crate::domain::events::DomainEvent;
use crate::error::{EcommerceError, Result};
use crate::services::events::EventPublisher;
use crate::store::{Store, ORDER_SAVE_ATTEMPTS};

pub use gateway::{ChargeRequest, GatewayPayment, HttpPaymentGateway, PaymentDetails, PaymentGateway};
pub use webhook::{WebhookOutcome, WebhookPayload, WebhookVerifier};

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventPublisher,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, events: EventPublisher) -> Self {
        Self { store, gateway, events }
    }

    /// Creates the gateway payment for a freshly placed order and records it.
    /// A payment the gateway settles immediately is applied to the order right away.
    #[instrument(skip(self, order, details), fields(order_id = %order.id))]
    pub async fn charge(&self, order: &Order, details: PaymentDetails) -> Result<Payment> {
        let request = ChargeRequest {
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount: order.total,
            method: order.payment_method,
            payer_name: order.customer_name.clone(),
            payer_email: order.customer_email.clone(),
            address: order.shipping_address.clone(),
            details,
        };
        let created = self.gateway.create_payment(&request).await?;

        let mut payment = Payment::create(order.id, order.payment_method, order.total, self.gateway.name());
        payment.transaction_id = Some(created.transaction_id);
        payment.boleto_url = created.boleto_url;
        payment.boleto_barcode = created.boleto_barcode;
        payment.pix_qr_code = created.pix_qr_code;
        payment.expires_at = created.expires_at;
        payment.card_last_four = created.card_last_four;
        payment.card_brand = created.card_brand;
        payment.gateway_response = Some(created.raw);
        self.store.insert_payment(&payment).await?;

        self.apply_status(&mut payment, created.status).await?;
        Ok(payment)
    }

    pub async fn for_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        self.store.payment_for_order(order_id).await
    }

    /// Records `status` on the payment and carries it over to the order.
    /// Returns `false` when the payment already had that status.
    #[instrument(skip(self, payment), fields(payment_id = %payment.id, order_id = %payment.order_id))]
    pub async fn apply_status(&self, payment: &mut Payment, status: GatewayStatus) -> Result<bool> {
        if !payment.apply_status(status) {
            return Ok(false);
        }
        self.store.update_payment(payment).await?;
        info!(status = %status, "payment status updated");

        let mut attempt = 1;
        loop {
            let mut order = self.store.get_order(payment.order_id).await?.ok_or(EcommerceError::OrderNotFound)?;
            match self.carry_to_order(&mut order, payment, status).await {
                Ok(()) => {
                    self.events.publish_all(order.take_events()).await;
                    return Ok(true);
                }
                Err(EcommerceError::OrderChanged) if attempt < ORDER_SAVE_ATTEMPTS => {
                    warn!(attempt, "order changed while applying payment status, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn carry_to_order(&self, order: &mut Order, payment: &Payment, status: GatewayStatus) -> Result<()> {
        match status {
            GatewayStatus::Approved => self.approve(order, payment).await,
            GatewayStatus::Failed | GatewayStatus::Cancelled => {
                if self.fail(order).await? {
                    self.events
                        .publish(DomainEvent::PaymentFailed { order_id: order.id, payment_id: payment.id, status })
                        .await;
                }
                Ok(())
            }
            GatewayStatus::Refunded => self.move_order(order, OrderStatus::Refunded).await,
            GatewayStatus::Chargeback => self.move_order(order, OrderStatus::Chargeback).await,
            GatewayStatus::Pending | GatewayStatus::Processing => Ok(()),
        }
    }

    async fn approve(&self, order: &mut Order, payment: &Payment) -> Result<()> {
        let expected = order.version();
        if let Err(e) = order.mark_paid() {
            warn!(status = %order.status, error = %e, "approval arrived for an order that can no longer be paid");
            return Ok(());
        }
        self.store.save_order(order, expected, &[]).await?;
        self.confirm_sale(order).await?;
        self.events
            .publish(DomainEvent::PaymentApproved { order_id: order.id, payment_id: payment.id, amount: payment.amount })
            .await;
        Ok(())
    }

    /// Logs a zero-delta confirmation entry per product line once an order is paid.
    async fn confirm_sale(&self, order: &Order) -> Result<()> {
        for line in &order.items {
            let Some(product_id) = line.item.product_id() else { continue };
            let Some(product) = self.store.get_product(product_id).await? else { continue };
            let change = StockChange {
                product_id,
                previous: product.stock_quantity,
                current: product.stock_quantity,
                threshold: product.low_stock_threshold,
            };
            let log = InventoryLog::record(
                &change,
                InventoryChangeKind::Confirmation,
                Some(format!("order {} paid, {} units sold", order.order_number, line.quantity)),
            )
            .for_order(order.id);
            self.store.record_inventory_log(&log).await?;
        }
        Ok(())
    }

    /// Returns whether the order changed.
    async fn fail(&self, order: &mut Order) -> Result<bool> {
        if order.payment_status == PaymentStatus::Paid {
            warn!(status = %order.status, "failure reported for an order already paid");
            return Ok(false);
        }
        let expected = order.version();
        if order.status == OrderStatus::Pending {
            let transition = order.transition_to(OrderStatus::PaymentFailed)?;
            self.persist(order, expected, transition).await?;
            return Ok(true);
        }
        if order.payment_status == PaymentStatus::Failed {
            return Ok(false);
        }
        order.payment_status = PaymentStatus::Failed;
        order.updated_at = Utc::now();
        self.store.save_order(order, expected, &[]).await?;
        Ok(true)
    }

    async fn move_order(&self, order: &mut Order, next: OrderStatus) -> Result<()> {
        let expected = order.version();
        match order.transition_to(next) {
            Ok(transition) => self.persist(order, expected, transition).await,
            Err(e) => {
                warn!(status = %order.status, to = %next, error = %e, "order transition skipped");
                Ok(())
            }
        }
    }

    async fn persist(&self, order: &Order, expected: OrderVersion, transition: Transition) -> Result<()> {
        if transition == Transition::Unchanged {
            return Ok(());
        }
        let moves = if transition.releases_stock() { order.release_moves() } else { vec![] };
        let changes = self.store.save_order(order, expected, &moves).await?;
        self.events.stock_changes(&changes).await;
        Ok(())
    }

    /// Asks the gateway for the current status while the order still awaits payment.
    pub async fn refresh_status(&self, order: &Order) -> Result<Option<Payment>> {
        let Some(mut payment) = self.store.payment_for_order(order.id).await? else {
            return Ok(None);
        };
        if !order.awaiting_payment() || !payment.status.is_awaiting() {
            return Ok(Some(payment));
        }
        let Some(transaction_id) = payment.transaction_id.clone() else {
            return Ok(Some(payment));
        };
        match self.gateway.fetch_status(&transaction_id).await {
            Ok(status) => {
                self.apply_status(&mut payment, status).await?;
            }
            Err(e) => warn!(order_id = %order.id, error = %e, "payment status poll failed"),
        }
        Ok(Some(payment))
    }

    /// Cancels a still-open gateway payment. Gateway errors are logged, not returned.
    pub async fn cancel_pending(&self, order_id: Uuid) -> Result<()> {
        let Some(mut payment) = self.store.payment_for_order(order_id).await? else {
            return Ok(());
        };
        if !payment.status.is_awaiting() {
            return Ok(());
        }
        if let Some(transaction_id) = payment.transaction_id.as_deref() {
            if let Err(e) = self.gateway.cancel(transaction_id).await {
                warn!(order_id = %order_id, error = %e, "gateway cancellation failed");
                return Ok(());
            }
        }
        if payment.apply_status(GatewayStatus::Cancelled) {
            self.store.update_payment(&payment).await?;
        }
        Ok(())
    }

    /// Refunds an approved payment, in full unless `amount` is given, and moves the order to refunded.
    #[instrument(skip(self))]
    pub async fn refund(&self, order_id: Uuid, amount: Option<Decimal>) -> Result<Payment> {
        let mut payment = self.store.payment_for_order(order_id).await?.ok_or(EcommerceError::PaymentNotFound)?;
        if payment.status != GatewayStatus::Approved {
            return Err(EcommerceError::Conflict(format!("payment is {}, only approved payments can be refunded", payment.status)));
        }
        if amount.is_some_and(|a| a <= Decimal::ZERO || a > payment.amount) {
            return Err(EcommerceError::Validation("refund amount must be positive and not exceed the payment".into()));
        }
        let transaction_id = payment.transaction_id.clone().ok_or(EcommerceError::PaymentNotFound)?;
        self.gateway.refund(&transaction_id, amount).await?;
        payment.refunded_amount = amount;
        self.apply_status(&mut payment, GatewayStatus::Refunded).await?;
        Ok(payment)
    }

    pub(crate) async fn by_transaction(&self, transaction_id: &str) -> Result<Payment> {
        self.store.payment_by_transaction(transaction_id).await?.ok_or(EcommerceError::PaymentNotFound)
    }
}
