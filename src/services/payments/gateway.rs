//! Payment gateway port and its HTTP adapter.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::domain::aggregates::{Address, GatewayStatus, PaymentMethod};
use crate::error::{EcommerceError, Result};

/// Method specific data supplied by the customer at checkout.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaymentDetails {
    /// CPF or CNPJ, digits only or formatted.
    pub document: Option<String>,
    /// Card token issued by the gateway's client-side SDK.
    pub card_token: Option<String>,
    pub card_brand: Option<String>,
    pub installments: Option<u32>,
}

impl PaymentDetails {
    /// Digits of the payer document when it is a valid CPF (11) or CNPJ (14) length.
    pub fn document_digits(&self) -> Option<String> {
        let digits: String = self.document.as_deref()?.chars().filter(char::is_ascii_digit).collect();
        matches!(digits.len(), 11 | 14).then_some(digits)
    }

    pub fn validate_for(&self, method: PaymentMethod) -> Result<()> {
        match method {
            PaymentMethod::Boleto if self.document_digits().is_none() => {
                Err(EcommerceError::Validation("boleto requires a CPF or CNPJ".into()))
            }
            PaymentMethod::CreditCard if self.card_token.as_deref().map_or(true, |t| t.trim().is_empty()) => {
                Err(EcommerceError::Validation("credit card payments require a card token".into()))
            }
            PaymentMethod::CreditCard if self.installments.is_some_and(|n| !(1..=12).contains(&n)) => {
                Err(EcommerceError::Validation("installments must be between 1 and 12".into()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payer_name: String,
    pub payer_email: String,
    pub address: Address,
    pub details: PaymentDetails,
}

/// What the gateway reported after creating a payment.
#[derive(Clone, Debug)]
pub struct GatewayPayment {
    pub transaction_id: String,
    pub status: GatewayStatus,
    pub boleto_url: Option<String>,
    pub boleto_barcode: Option<String>,
    pub pix_qr_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub card_last_four: Option<String>,
    pub card_brand: Option<String>,
    pub raw: Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name stored on payment records.
    fn name(&self) -> &str;
    async fn create_payment(&self, request: &ChargeRequest) -> Result<GatewayPayment>;
    async fn fetch_status(&self, transaction_id: &str) -> Result<GatewayStatus>;
    async fn cancel(&self, transaction_id: &str) -> Result<()>;
    /// Refunds `amount`, or the whole payment when `None`.
    async fn refund(&self, transaction_id: &str, amount: Option<Decimal>) -> Result<()>;
}

pub struct HttpPaymentGateway {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    notification_url: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            notification_url: config.notification_url.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn payload(&self, request: &ChargeRequest, expires_at: Option<DateTime<Utc>>) -> Value {
        let (first_name, last_name) = match request.payer_name.trim().split_once(' ') {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (request.payer_name.trim().to_string(), String::new()),
        };
        let mut payer = json!({
            "email": request.payer_email,
            "first_name": first_name,
            "last_name": last_name,
            "address": {
                "zip_code": request.address.zip_code,
                "street_name": request.address.street,
                "street_number": request.address.number,
                "neighborhood": request.address.neighborhood,
                "city": request.address.city,
                "federal_unit": request.address.state,
            },
        });
        if let Some(document) = request.details.document_digits() {
            let kind = if document.len() > 11 { "CNPJ" } else { "CPF" };
            payer["identification"] = json!({ "type": kind, "number": document });
        }

        let mut body = json!({
            "transaction_amount": request.amount.to_f64().unwrap_or_default(),
            "description": format!("Order {}", request.order_number),
            "payment_method_id": method_id(request.method, &request.details),
            "payer": payer,
            "external_reference": request.order_id.to_string(),
        });
        if let Some(url) = &self.notification_url {
            body["notification_url"] = json!(url);
        }
        if let Some(at) = expires_at {
            body["date_of_expiration"] = json!(at.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string());
        }
        if request.method == PaymentMethod::CreditCard {
            body["token"] = json!(request.details.card_token);
            body["installments"] = json!(request.details.installments.unwrap_or(1));
        }
        body
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(body);
        }
        let message = body["message"].as_str().unwrap_or("gateway request failed").to_string();
        error!(status = %status, message = %message, "payment gateway rejected request");
        Err(match status {
            StatusCode::NOT_FOUND => EcommerceError::PaymentNotFound,
            _ => EcommerceError::Gateway(message),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn name(&self) -> &str {
        "mercadopago"
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, method = %request.method))]
    async fn create_payment(&self, request: &ChargeRequest) -> Result<GatewayPayment> {
        request.details.validate_for(request.method)?;
        let expires_at = expiry_for(request.method, Utc::now());
        let body = self.payload(request, expires_at);
        let raw = self.send(self.client.post(self.url("/payments")).json(&body)).await?;
        let payment = parse_payment(raw, expires_at)?;
        info!(transaction_id = %payment.transaction_id, status = %payment.status, "gateway payment created");
        Ok(payment)
    }

    async fn fetch_status(&self, transaction_id: &str) -> Result<GatewayStatus> {
        let raw = self.send(self.client.get(self.url(&format!("/payments/{transaction_id}")))).await?;
        Ok(GatewayStatus::from_provider(raw["status"].as_str().unwrap_or_default()))
    }

    #[instrument(skip(self))]
    async fn cancel(&self, transaction_id: &str) -> Result<()> {
        let url = self.url(&format!("/payments/{transaction_id}"));
        self.send(self.client.put(url).json(&json!({ "status": "cancelled" }))).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn refund(&self, transaction_id: &str, amount: Option<Decimal>) -> Result<()> {
        let body = match amount {
            Some(amount) => json!({ "amount": amount.to_f64().unwrap_or_default() }),
            None => json!({}),
        };
        let url = self.url(&format!("/payments/{transaction_id}/refunds"));
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }
}

fn method_id(method: PaymentMethod, details: &PaymentDetails) -> String {
    match method {
        PaymentMethod::Pix => "pix".into(),
        PaymentMethod::Boleto => "bolbradesco".into(),
        PaymentMethod::CreditCard => details
            .card_brand
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "credit_card".into()),
    }
}

/// Boleto is payable for three days, a PIX charge for one.
pub fn expiry_for(method: PaymentMethod, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match method {
        PaymentMethod::Boleto => Some(now + Duration::days(3)),
        PaymentMethod::Pix => Some(now + Duration::hours(24)),
        PaymentMethod::CreditCard => None,
    }
}

fn parse_payment(raw: Value, expires_at: Option<DateTime<Utc>>) -> Result<GatewayPayment> {
    let transaction_id = match &raw["id"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => return Err(EcommerceError::Gateway("response carried no payment id".into())),
    };
    let text = |v: &Value| v.as_str().map(str::to_string);
    Ok(GatewayPayment {
        transaction_id,
        status: GatewayStatus::from_provider(raw["status"].as_str().unwrap_or_default()),
        boleto_url: text(&raw["transaction_details"]["external_resource_url"]),
        boleto_barcode: text(&raw["barcode"]["content"]).or_else(|| text(&raw["barcode"])),
        pix_qr_code: text(&raw["point_of_interaction"]["transaction_data"]["qr_code"]),
        expires_at,
        card_last_four: text(&raw["card"]["last_four_digits"]),
        card_brand: text(&raw["payment_method_id"]).filter(|m| !matches!(m.as_str(), "pix" | "bolbradesco")),
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn gateway(server: &MockServer) -> HttpPaymentGateway {
        HttpPaymentGateway::new(&PaymentConfig {
            api_url: server.base_url(),
            api_key: "test-key".into(),
            webhook_secret: None,
            notification_url: Some("https://shop.example.com/api/v1/webhooks/payment".into()),
        })
    }

    fn request(method: PaymentMethod, details: PaymentDetails) -> ChargeRequest {
        ChargeRequest {
            order_id: Uuid::now_v7(),
            order_number: "ORD-20240510-0000ABCD".into(),
            amount: Decimal::new(12990, 2),
            method,
            payer_name: "Beatriz Souza Lima".into(),
            payer_email: "bia@example.com".into(),
            address: Address {
                street: "Av. Paulista".into(),
                number: "1000".into(),
                complement: None,
                neighborhood: "Bela Vista".into(),
                city: "São Paulo".into(),
                state: "SP".into(),
                zip_code: "01310100".into(),
            },
            details,
        }
    }

    #[test]
    fn test_payment_details_validation() {
        let cpf = PaymentDetails { document: Some("123.456.789-09".into()), ..Default::default() };
        assert_eq!(cpf.document_digits().as_deref(), Some("12345678909"));
        assert!(cpf.validate_for(PaymentMethod::Boleto).is_ok());

        let short = PaymentDetails { document: Some("1234".into()), ..Default::default() };
        assert!(short.validate_for(PaymentMethod::Boleto).is_err());
        assert!(short.validate_for(PaymentMethod::Pix).is_ok());
        assert!(PaymentDetails::default().validate_for(PaymentMethod::CreditCard).is_err());

        let card = PaymentDetails { card_token: Some("tok_123".into()), installments: Some(13), ..Default::default() };
        assert!(card.validate_for(PaymentMethod::CreditCard).is_err());
    }

    #[test]
    fn test_expiry_windows() {
        let now = Utc::now();
        assert_eq!(expiry_for(PaymentMethod::Boleto, now), Some(now + Duration::days(3)));
        assert_eq!(expiry_for(PaymentMethod::Pix, now), Some(now + Duration::hours(24)));
        assert_eq!(expiry_for(PaymentMethod::CreditCard, now), None);
    }

    #[tokio::test]
    async fn test_create_boleto_payment() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/payments")
                    .header("authorization", "Bearer test-key")
                    .json_body_partial(r#"{"payment_method_id":"bolbradesco","payer":{"identification":{"type":"CPF","number":"12345678909"}}}"#);
                then.status(201).json_body(json!({
                    "id": 98765,
                    "status": "pending",
                    "transaction_details": { "external_resource_url": "https://boleto.example.com/98765" },
                    "barcode": { "content": "23791234500000129900000000000000000000000000" }
                }));
            })
            .await;

        let details = PaymentDetails { document: Some("123.456.789-09".into()), ..Default::default() };
        let payment = gateway(&server).create_payment(&request(PaymentMethod::Boleto, details)).await.unwrap();
        mock.assert_async().await;
        assert_eq!(payment.transaction_id, "98765");
        assert_eq!(payment.status, GatewayStatus::Pending);
        assert_eq!(payment.boleto_url.as_deref(), Some("https://boleto.example.com/98765"));
        assert!(payment.boleto_barcode.is_some());
        assert!(payment.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_create_pix_payment_reads_qr_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/payments").json_body_partial(r#"{"payment_method_id":"pix"}"#);
                then.status(201).json_body(json!({
                    "id": "pix-1",
                    "status": "pending",
                    "point_of_interaction": { "transaction_data": { "qr_code": "00020126580014br.gov.bcb.pix" } }
                }));
            })
            .await;

        let payment = gateway(&server)
            .create_payment(&request(PaymentMethod::Pix, PaymentDetails::default()))
            .await
            .unwrap();
        assert_eq!(payment.pix_qr_code.as_deref(), Some("00020126580014br.gov.bcb.pix"));
    }

    #[tokio::test]
    async fn test_gateway_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/payments");
                then.status(400).json_body(json!({ "message": "invalid card token" }));
            })
            .await;

        let details = PaymentDetails { card_token: Some("bad".into()), ..Default::default() };
        let err = gateway(&server)
            .create_payment(&request(PaymentMethod::CreditCard, details))
            .await
            .unwrap_err();
        assert!(matches!(err, EcommerceError::Gateway(ref m) if m == "invalid card token"));
    }

    #[tokio::test]
    async fn test_fetch_status_and_cancel() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/payments/555");
                then.status(200).json_body(json!({ "id": 555, "status": "approved" }));
            })
            .await;
        let cancel = server
            .mock_async(|when, then| {
                when.method(PUT).path("/payments/555").json_body(json!({ "status": "cancelled" }));
                then.status(200).json_body(json!({ "id": 555, "status": "cancelled" }));
            })
            .await;

        let gateway = gateway(&server);
        assert_eq!(gateway.fetch_status("555").await.unwrap(), GatewayStatus::Approved);
        gateway.cancel("555").await.unwrap();
        cancel.assert_async().await;
    }
}
