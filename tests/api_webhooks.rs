//! Payment and Instagram webhook endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{address, app, app_with, call, create_product, register_customer, TestApp, WEBHOOK_SECRET};
use salon_commerce::services::payments::webhook::sign;

fn signed(body: &str) -> common::Call<'static> {
    call("POST", "/api/v1/webhooks/payment")
        .header("x-signature", sign(WEBHOOK_SECRET, body.as_bytes()))
        .header("content-type", "application/json")
        .raw(body.to_string())
}

#[tokio::test]
async fn unsigned_or_forged_webhooks_are_rejected() {
    let app = app();
    let body = json!({ "event": "payment.status_updated", "data": { "id": "tx-1", "status": "approved" } }).to_string();

    let (status, _) = call("POST", "/api/v1/webhooks/payment").raw(body.clone()).send(&app).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call("POST", "/api/v1/webhooks/payment")
        .header("x-signature", sign("someone-else", body.as_bytes()))
        .raw(body)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn local_environment_skips_signature_check() {
    let app = app_with(&[("APP_ENV", "local")]);
    let body = json!({ "event": "payment.created", "data": { "id": "tx-1", "status": "pending" } }).to_string();
    let (status, ack) = call("POST", "/api/v1/webhooks/payment").raw(body).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"]["outcome"], "ignored");
}

#[tokio::test]
async fn malformed_and_unknown_payloads() {
    let app = app();

    let (status, body) = signed(r#"{"event":"payment.status_updated","data":{"status":"approved"}}"#).send(&app).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = signed("not json").send(&app).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        signed(r#"{"event":"payment.status_updated","data":{"id":"missing-tx","status":"approved"}}"#).send(&app).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, ack) = signed(r#"{"event":"payment.created","data":{"id":"missing-tx","status":"pending"}}"#).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "success");
}

/// Places a one-unit PIX order and returns its id and gateway transaction id.
async fn placed_order(app: &TestApp, customer: &str, product: &str) -> (String, String) {
    let (status, _) = call("POST", "/api/v1/cart/items")
        .customer(customer)
        .json(json!({ "item": { "kind": "product", "id": product }, "quantity": 1 }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, receipt) = call("POST", "/api/v1/checkout")
        .customer(customer)
        .json(json!({ "shipping_address": address(), "payment_method": "pix" }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{receipt}");
    let order_id = receipt["order"]["id"].as_str().unwrap().to_string();
    let transaction = format!("fake-{}", receipt["order"]["order_number"].as_str().unwrap());
    (order_id, transaction)
}

async fn deliver(app: &TestApp, event: &str, transaction: &str, status: &str) -> Value {
    let body = json!({ "event": event, "data": { "id": transaction, "status": status } }).to_string();
    let (code, ack) = signed(&body).send(app).await;
    assert_eq!(code, StatusCode::OK, "{ack}");
    ack
}

async fn order_detail(app: &TestApp, customer: &str, order_id: &str) -> Value {
    let (status, detail) = call("GET", &format!("/api/v1/orders/{order_id}")).customer(customer).send(app).await;
    assert_eq!(status, StatusCode::OK);
    detail
}

async fn stock_of(app: &TestApp, product: &str) -> i32 {
    let id = Uuid::parse_str(product).unwrap();
    app.store.get_product(id).await.unwrap().unwrap().stock_quantity
}

#[tokio::test]
async fn refund_and_chargeback_events_move_paid_orders() {
    let app = app();
    let product = create_product(&app, "Protetor Solar FPS 50", "59.90", 10).await;
    let customer = register_customer(&app, "Camila Rocha", "camila@example.com").await;

    for (event, expected) in [("payment.refunded", "refunded"), ("payment.chargeback", "chargeback")] {
        let (order_id, transaction) = placed_order(&app, &customer, &product).await;
        deliver(&app, "payment.status_updated", &transaction, "approved").await;
        assert_eq!(order_detail(&app, &customer, &order_id).await["order"]["status"], "processing");

        let ack = deliver(&app, event, &transaction, expected).await;
        assert_eq!(ack["result"]["outcome"], "applied");
        assert_eq!(ack["result"]["status"], expected);
        assert_eq!(ack["result"]["changed"], true);

        let detail = order_detail(&app, &customer, &order_id).await;
        assert_eq!(detail["order"]["status"], expected);
        assert_eq!(detail["order"]["payment_status"], expected);
        assert_eq!(detail["payment"]["status"], expected);

        let again = deliver(&app, event, &transaction, expected).await;
        assert_eq!(again["result"]["changed"], false);
    }
    // Refunds and chargebacks keep the goods out of stock.
    assert_eq!(stock_of(&app, &product).await, 8);
}

#[tokio::test]
async fn chargeback_on_unpaid_order_only_updates_payment() {
    let app = app();
    let product = create_product(&app, "Máscara Capilar", "45.00", 4).await;
    let customer = register_customer(&app, "Renata Lima", "renata@example.com").await;
    let (order_id, transaction) = placed_order(&app, &customer, &product).await;

    let ack = deliver(&app, "payment.chargeback", &transaction, "charged_back").await;
    assert_eq!(ack["result"]["changed"], true);

    let detail = order_detail(&app, &customer, &order_id).await;
    assert_eq!(detail["order"]["status"], "pending");
    assert_eq!(detail["order"]["payment_status"], "pending");
    assert_eq!(detail["payment"]["status"], "chargeback");
    assert_eq!(stock_of(&app, &product).await, 3);
}

#[tokio::test]
async fn instagram_subscription_handshake() {
    let app = app();
    let (status, bytes) = call(
        "GET",
        "/api/v1/webhooks/instagram?hub.mode=subscribe&hub.verify_token=ig-verify&hub.challenge=1158201444",
    )
    .send_raw(&app)
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"1158201444");

    let (status, _) = call("GET", "/api/v1/webhooks/instagram?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
        .send_raw(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call("POST", "/api/v1/webhooks/instagram").send_raw(&app).await;
    assert_eq!(status, StatusCode::OK);
}
