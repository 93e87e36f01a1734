//! Domain events
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{GatewayStatus, OrderStatus};
use crate::domain::value_objects::ItemRef;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced { order_id: Uuid, order_number: String, user_id: Uuid, total: Decimal },
    OrderStatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    PaymentApproved { order_id: Uuid, payment_id: Uuid, amount: Decimal },
    PaymentFailed { order_id: Uuid, payment_id: Uuid, status: GatewayStatus },
    StockLow { product_id: Uuid, stock: i32, threshold: i32 },
    StockDepleted { product_id: Uuid },
    ReviewSubmitted { review_id: Uuid, target: ItemRef, rating: u8 },
    AppointmentBooked { appointment_id: Uuid, service_id: Uuid, esthetician_id: Uuid, scheduled_at: DateTime<Utc> },
}

impl DomainEvent {
    /// NATS subject, `salon.<entity>.<event>`.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } => "salon.order.placed",
            DomainEvent::OrderStatusChanged { .. } => "salon.order.status_changed",
            DomainEvent::PaymentApproved { .. } => "salon.payment.approved",
            DomainEvent::PaymentFailed { .. } => "salon.payment.failed",
            DomainEvent::StockLow { .. } => "salon.stock.low",
            DomainEvent::StockDepleted { .. } => "salon.stock.depleted",
            DomainEvent::ReviewSubmitted { .. } => "salon.review.submitted",
            DomainEvent::AppointmentBooked { .. } => "salon.appointment.booked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let id = Uuid::now_v7();
        let event = DomainEvent::OrderStatusChanged { order_id: id, from: OrderStatus::Pending, to: OrderStatus::PaymentFailed };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order_status_changed");
        assert_eq!(json["to"], "payment_failed");
        assert_eq!(event.subject(), "salon.order.status_changed");
    }
}
