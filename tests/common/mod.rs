//! Shared harness: the full router over an in-memory store and a fake gateway.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

use salon_commerce::domain::aggregates::GatewayStatus;
use salon_commerce::error::Result;
use salon_commerce::services::payments::{ChargeRequest, GatewayPayment, PaymentGateway};
use salon_commerce::services::EventPublisher;
use salon_commerce::store::{MemoryStore, Store};
use salon_commerce::{create_router, AppState, Config};

pub const ADMIN_TOKEN: &str = "admin-secret";
pub const WEBHOOK_SECRET: &str = "whsec-test";

/// Gateway that accepts every payment as pending and reports whatever status is set.
#[derive(Default)]
pub struct FakeGateway {
    pub status: Mutex<Option<GatewayStatus>>,
    pub cancelled: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_payment(&self, request: &ChargeRequest) -> Result<GatewayPayment> {
        Ok(GatewayPayment {
            transaction_id: format!("fake-{}", request.order_number),
            status: GatewayStatus::Pending,
            boleto_url: None,
            boleto_barcode: None,
            pix_qr_code: Some("00020126pix".into()),
            expires_at: None,
            card_last_four: None,
            card_brand: None,
            raw: json!({ "status": "pending" }),
        })
    }

    async fn fetch_status(&self, _transaction_id: &str) -> Result<GatewayStatus> {
        Ok(self.status.lock().unwrap().unwrap_or(GatewayStatus::Pending))
    }

    async fn cancel(&self, transaction_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(transaction_id.to_string());
        Ok(())
    }

    async fn refund(&self, _transaction_id: &str, _amount: Option<Decimal>) -> Result<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn Store>,
    pub gateway: Arc<FakeGateway>,
    pub events: EventPublisher,
}

pub fn app() -> TestApp {
    app_with(&[])
}

pub fn app_with(extra: &[(&str, &str)]) -> TestApp {
    let mut vars: HashMap<String, String> = [
        ("ADMIN_API_TOKEN", ADMIN_TOKEN),
        ("PAYMENT_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("APP_ENV", "testing"),
        ("SHIPPING_FLAT_FEE", "15.00"),
        ("INSTAGRAM_VERIFY_TOKEN", "ig-verify"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let gateway = Arc::new(FakeGateway::default());
    let events = EventPublisher::recording();
    let state = AppState::new(config, store.clone(), gateway.clone(), events.clone());
    TestApp { router: create_router(state), store, gateway, events }
}

pub struct Call<'a> {
    method: &'a str,
    uri: &'a str,
    headers: Vec<(&'a str, String)>,
    body: Body,
    content_type: Option<&'a str>,
}

pub fn call<'a>(method: &'a str, uri: &'a str) -> Call<'a> {
    Call { method, uri, headers: vec![], body: Body::empty(), content_type: None }
}

impl<'a> Call<'a> {
    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::from(value.to_string());
        self.content_type = Some("application/json");
        self
    }

    pub fn raw(mut self, bytes: impl Into<Body>) -> Self {
        self.body = bytes.into();
        self
    }

    pub fn header(mut self, name: &'a str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn admin(self) -> Self {
        self.header("authorization", format!("Bearer {ADMIN_TOKEN}"))
    }

    pub fn customer(self, id: &str) -> Self {
        self.header("x-customer-id", id.to_string())
    }

    pub async fn send(self, app: &TestApp) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(app).await;
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, body)
    }

    pub async fn send_raw(self, app: &TestApp) -> (StatusCode, bytes::Bytes) {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if let Some(ct) = self.content_type {
            builder = builder.header("content-type", ct);
        }
        for (name, value) in &self.headers {
            builder = builder.header(*name, value.as_str());
        }
        let response = app.router.clone().oneshot(builder.body(self.body).unwrap()).await.expect("oneshot failed");
        let status = response.status();
        let body = response.into_body().collect().await.expect("body collect failed").to_bytes();
        (status, body)
    }
}

/// Registers a customer through the API and returns its id.
pub async fn register_customer(app: &TestApp, name: &str, email: &str) -> String {
    let (status, body) = call("POST", "/api/v1/customers")
        .json(json!({ "name": name, "email": email }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

/// Creates an active product through the admin API and returns its id.
pub async fn create_product(app: &TestApp, name: &str, price: &str, stock: i32) -> String {
    let (status, body) = call("POST", "/api/v1/admin/products")
        .admin()
        .json(json!({ "name": name, "price": price, "stock_quantity": stock }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

pub fn address() -> Value {
    json!({
        "street": "Rua das Flores",
        "number": "120",
        "neighborhood": "Jardins",
        "city": "São Paulo",
        "state": "sp",
        "zip_code": "01415-000"
    })
}
