//! Storefront browsing, bookings and back-office routes.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{app, call, create_product, register_customer, ADMIN_TOKEN};

#[tokio::test]
async fn health_reports_service_name() {
    let app = app();
    let (status, body) = call("GET", "/health").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "salon-commerce");
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let app = app();
    let (status, body) = call("GET", "/api/v1/admin/dashboard").send(&app).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let (status, _) = call("GET", "/api/v1/admin/dashboard")
        .header("authorization", "Bearer not-the-token")
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call("GET", "/api/v1/admin/dashboard")
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn catalog_listing_and_detail() {
    let app = app();
    create_product(&app, "Creme Hidratante", "120.00", 8).await;
    create_product(&app, "Gel de Limpeza", "49.90", 0).await;

    let (status, page) = call("GET", "/api/v1/products?sort=price_asc").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["data"][0]["name"], "Gel de Limpeza");

    let (status, detail) = call("GET", "/api/v1/products/creme-hidratante").send(&app).await;
    assert_eq!(status, StatusCode::OK, "{detail}");
    assert_eq!(detail["product"]["stock_status"], "in_stock");

    let (status, _) = call("GET", "/api/v1/products/nao-existe").send(&app).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call("GET", "/api/v1/products?sort=cheapest").send(&app).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, home) = call("GET", "/api/v1/home").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(home["latest_products"].as_array().unwrap().len(), 2);
    assert!(home["instagram_posts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    register_customer(&app, "Luana Costa", "luana@example.com").await;
    let (status, _) = call("POST", "/api/v1/customers")
        .json(json!({ "name": "Outra Luana", "email": "luana@example.com" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call("POST", "/api/v1/customers")
        .json(json!({ "name": "Sem Email", "email": "not-an-email" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn booking_a_service_blocks_the_slot() {
    let app = app();
    let (status, staff) = call("POST", "/api/v1/admin/staff")
        .admin()
        .json(json!({ "name": "Dra. Patrícia", "email": "patricia@example.com" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, service) = call("POST", "/api/v1/admin/services")
        .admin()
        .json(json!({ "name": "Limpeza de Pele", "price": "180.00", "duration_minutes": 90 }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{service}");

    let (_, staff_list) = call("GET", "/api/v1/estheticians").send(&app).await;
    assert_eq!(staff_list[0]["name"], "Dra. Patrícia");

    let customer = register_customer(&app, "Renata Melo", "renata@example.com").await;
    let at = (Utc::now() + Duration::days(2)).date_naive().and_hms_opt(14, 0, 0).unwrap().and_utc();
    let request = |when: chrono::DateTime<Utc>| {
        json!({ "service_id": service["id"], "esthetician_id": staff["id"], "scheduled_at": when })
    };

    let (status, booked) = call("POST", "/api/v1/appointments").customer(&customer).json(request(at)).send(&app).await;
    assert_eq!(status, StatusCode::CREATED, "{booked}");
    assert_eq!(booked["service_name"], "Limpeza de Pele");

    let (status, _) = call("POST", "/api/v1/appointments")
        .customer(&customer)
        .json(request(at + Duration::minutes(60)))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let id = booked["id"].as_str().unwrap();
    let (status, confirmed) = call("PUT", &format!("/api/v1/admin/appointments/{id}/status"))
        .admin()
        .json(json!({ "status": "confirmed" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");
}

#[tokio::test]
async fn inventory_adjustments_and_exports() {
    let app = app();
    let product = create_product(&app, "Máscara de Argila", "65.00", 10).await;

    let (status, result) = call("POST", &format!("/api/v1/admin/inventory/{product}/adjust"))
        .admin()
        .json(json!({ "adjustment": { "type": "subtract", "quantity": 7 }, "reason": "avaria" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK, "{result}");
    assert_eq!(result["new_stock"], 3);
    assert_eq!(result["stock_status"], "low_stock");

    let (_, low) = call("GET", "/api/v1/admin/inventory/low-stock").admin().send(&app).await;
    assert_eq!(low["products"].as_array().unwrap().len(), 1);

    let (_, history) = call("GET", &format!("/api/v1/admin/inventory/{product}/history")).admin().send(&app).await;
    assert_eq!(history[0]["kind"], "reduction");

    let (status, csv) = call("GET", "/api/v1/admin/inventory/export").admin().send_raw(&app).await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(csv.to_vec()).unwrap();
    assert!(csv.starts_with("sku,name,stock,status"));
    assert!(csv.contains("Máscara de Argila"));

    let (status, availability) = call("POST", "/api/v1/inventory/availability")
        .json(json!({ product.clone(): 3, "0190f1c4-0000-7000-8000-000000000000": 1 }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability[&product], true);
    assert_eq!(availability["0190f1c4-0000-7000-8000-000000000000"], false);
}

#[tokio::test]
async fn report_export_uses_requested_period() {
    let app = app();
    let (status, sales) = call("GET", "/api/v1/admin/reports/sales?period=7days").admin().send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert!(sales["growth"].is_null());

    let (status, _) = call("GET", "/api/v1/admin/reports/sales?period=custom").admin().send(&app).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, csv) = call("GET", "/api/v1/admin/reports/export/sales?period=custom&start_date=2024-05-01&end_date=2024-05-31")
        .admin()
        .send_raw(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(csv.to_vec()).unwrap().starts_with("date,orders,total"));
}
