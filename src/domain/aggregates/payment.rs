//! Payment Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    pub enum PaymentMethod {
        CreditCard => "credit_card",
        Pix => "pix",
        Boleto => "boleto",
    }
}

string_enum! {
    /// Status of a payment record, as reported by the gateway.
    pub enum GatewayStatus {
        Pending => "pending",
        Processing => "processing",
        Approved => "approved",
        Failed => "failed",
        Cancelled => "cancelled",
        Refunded => "refunded",
        Chargeback => "chargeback",
    }
}

impl GatewayStatus {
    /// Maps a provider status string. Unknown statuses stay pending.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "approved" | "paid" => GatewayStatus::Approved,
            "in_process" | "processing" => GatewayStatus::Processing,
            "rejected" | "refused" => GatewayStatus::Failed,
            "cancelled" | "canceled" => GatewayStatus::Cancelled,
            "refunded" => GatewayStatus::Refunded,
            "chargeback" | "charged_back" => GatewayStatus::Chargeback,
            _ => GatewayStatus::Pending,
        }
    }

    /// The customer may still complete this payment.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, GatewayStatus::Pending | GatewayStatus::Processing)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub status: GatewayStatus,
    pub amount: Decimal,
    pub gateway: String,
    pub transaction_id: Option<String>,
    pub boleto_url: Option<String>,
    pub boleto_barcode: Option<String>,
    pub pix_qr_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub card_last_four: Option<String>,
    pub card_brand: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refunded_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn create(order_id: Uuid, method: PaymentMethod, amount: Decimal, gateway: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            order_id,
            method,
            status: GatewayStatus::Pending,
            amount,
            gateway: gateway.into(),
            transaction_id: None,
            boleto_url: None,
            boleto_barcode: None,
            pix_qr_code: None,
            expires_at: None,
            card_last_four: None,
            card_brand: None,
            gateway_response: None,
            paid_at: None,
            refunded_at: None,
            refunded_amount: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a new status. Returns `false` when nothing changed.
    pub fn apply_status(&mut self, status: GatewayStatus) -> bool {
        if self.status == status {
            return false;
        }
        let now = Utc::now();
        match status {
            GatewayStatus::Approved => self.paid_at = Some(now),
            GatewayStatus::Refunded => {
                self.refunded_at = Some(now);
                self.refunded_amount.get_or_insert(self.amount);
            }
            _ => {}
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_mapping() {
        let cases = [
            ("pending", GatewayStatus::Pending),
            ("approved", GatewayStatus::Approved),
            ("paid", GatewayStatus::Approved),
            ("in_process", GatewayStatus::Processing),
            ("processing", GatewayStatus::Processing),
            ("rejected", GatewayStatus::Failed),
            ("refused", GatewayStatus::Failed),
            ("cancelled", GatewayStatus::Cancelled),
            ("canceled", GatewayStatus::Cancelled),
            ("refunded", GatewayStatus::Refunded),
            ("chargeback", GatewayStatus::Chargeback),
            ("charged_back", GatewayStatus::Chargeback),
            ("authorized", GatewayStatus::Pending),
            ("", GatewayStatus::Pending),
        ];
        for (raw, expected) in cases {
            assert_eq!(GatewayStatus::from_provider(raw), expected, "{raw}");
        }
    }

    #[test]
    fn test_apply_status_is_idempotent() {
        let mut payment = Payment::create(Uuid::now_v7(), PaymentMethod::Pix, Decimal::new(5990, 2), "mercadopago");
        assert!(payment.apply_status(GatewayStatus::Approved));
        assert!(payment.paid_at.is_some());
        assert!(!payment.apply_status(GatewayStatus::Approved));
        assert!(payment.apply_status(GatewayStatus::Refunded));
        assert_eq!(payment.refunded_amount, Some(Decimal::new(5990, 2)));
    }
}
