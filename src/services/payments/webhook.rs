//! Gateway webhooks: signature check and event dispatch.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::PaymentService;
use crate::domain::aggregates::GatewayStatus;
use crate::error::{EcommerceError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// Lowercase hex HMAC-SHA256 of `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secret: Option<String>,
    enforce: bool,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, enforce: bool) -> Self {
        Self { secret, enforce }
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<()> {
        if !self.enforce {
            return Ok(());
        }
        let Some(secret) = self.secret.as_deref() else {
            warn!("webhook received but no signing secret is configured");
            return Err(EcommerceError::Unauthorized);
        };
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("webhook without signature");
            return Err(EcommerceError::Unauthorized);
        };
        let expected = sign(secret, body);
        if expected.as_bytes().ct_eq(signature.to_ascii_lowercase().as_bytes()).into() {
            Ok(())
        } else {
            warn!("webhook signature mismatch");
            Err(EcommerceError::Unauthorized)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub event: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    /// Gateway transaction id; some providers send it as a number.
    pub id: Option<Value>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { status: GatewayStatus, changed: bool },
    Ignored { event: String },
}

impl WebhookOutcome {
    pub fn message(&self) -> String {
        match self {
            WebhookOutcome::Applied { changed: true, status } => format!("payment status updated to {status}"),
            WebhookOutcome::Applied { changed: false, .. } => "payment status unchanged".into(),
            WebhookOutcome::Ignored { event } => format!("event {event} acknowledged"),
        }
    }
}

impl PaymentService {
    pub async fn handle_webhook(&self, payload: WebhookPayload) -> Result<WebhookOutcome> {
        let missing = |field: &str| EcommerceError::MalformedRequest(format!("missing {field}"));
        let event = payload.event.filter(|e| !e.is_empty()).ok_or_else(|| missing("event"))?;
        let data = payload.data.ok_or_else(|| missing("data"))?;
        let transaction_id = match data.id {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(missing("data.id")),
        };
        let raw_status = data.status.filter(|s| !s.is_empty()).ok_or_else(|| missing("data.status"))?;

        let status = match event.as_str() {
            "payment.status_updated" => GatewayStatus::from_provider(&raw_status),
            "payment.refunded" => GatewayStatus::Refunded,
            "payment.chargeback" => GatewayStatus::Chargeback,
            _ => {
                info!(event = %event, "webhook event ignored");
                return Ok(WebhookOutcome::Ignored { event });
            }
        };

        let mut payment = self.by_transaction(&transaction_id).await?;
        let changed = self.apply_status(&mut payment, status).await?;
        info!(event = %event, transaction_id = %transaction_id, status = %status, changed, "webhook processed");
        Ok(WebhookOutcome::Applied { status, changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_salon";

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"event":"payment.status_updated"}"#;
        let verifier = WebhookVerifier::new(Some(SECRET.into()), true);
        assert!(verifier.verify(body, Some(sign(SECRET, body).as_str())).is_ok());
        assert!(verifier.verify(body, Some(sign(SECRET, body).to_uppercase().as_str())).is_ok());
    }

    #[test]
    fn test_tampered_or_missing_signature_rejected() {
        let body = br#"{"event":"payment.status_updated"}"#;
        let verifier = WebhookVerifier::new(Some(SECRET.into()), true);
        let tampered = br#"{"event":"payment.refunded"}"#;
        assert!(matches!(verifier.verify(tampered, Some(sign(SECRET, body).as_str())), Err(EcommerceError::Unauthorized)));
        assert!(matches!(verifier.verify(body, None), Err(EcommerceError::Unauthorized)));
        assert!(matches!(verifier.verify(body, Some(sign("other", body).as_str())), Err(EcommerceError::Unauthorized)));
    }

    #[test]
    fn test_unconfigured_secret_rejects_unless_local() {
        let body = b"{}";
        assert!(WebhookVerifier::new(None, true).verify(body, Some("abc")).is_err());
        assert!(WebhookVerifier::new(None, false).verify(body, None).is_ok());
    }

    #[test]
    fn test_payload_accepts_numeric_id() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"event":"payment.status_updated","data":{"id":12345,"status":"approved"}}"#).unwrap();
        assert!(matches!(payload.data.and_then(|d| d.id), Some(Value::Number(_))));
    }
}
