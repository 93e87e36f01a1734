use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::extract::require_admin;
use super::handlers::{account, admin, health, storefront, webhooks};
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/home", get(storefront::home))
        .route("/products", get(storefront::list_products))
        .route("/products/featured", get(storefront::featured_products))
        .route("/products/:slug", get(storefront::product_detail))
        .route("/services", get(storefront::list_services))
        .route("/services/featured", get(storefront::featured_services))
        .route("/services/:slug", get(storefront::service_detail))
        .route("/categories", get(storefront::categories))
        .route("/categories/:slug", get(storefront::category_detail))
        .route("/search", get(storefront::search))
        .route("/reviews", get(storefront::reviews))
        .route("/estheticians", get(storefront::estheticians))
        .route("/instagram/posts", get(storefront::instagram_posts))
        .route("/inventory/availability", post(storefront::availability))
        .route("/customers", post(storefront::register))
        .route("/webhooks/payment", post(webhooks::payment))
        .route("/webhooks/instagram", get(webhooks::instagram_verify).post(webhooks::instagram_update));

    let customer = Router::new()
        .route("/me", get(account::profile).put(account::update_profile))
        .route("/me/reviews", get(account::my_reviews).post(account::create_review))
        .route("/me/reviews/:id", put(account::update_review).delete(account::delete_review))
        .route("/cart", get(account::cart).delete(account::clear_cart))
        .route("/cart/items", post(account::add_to_cart))
        .route("/cart/items/:id", put(account::update_cart_line).delete(account::remove_cart_line))
        .route("/checkout", post(account::checkout))
        .route("/orders", get(account::orders))
        .route("/orders/:id", get(account::order))
        .route("/orders/:id/payment", get(account::order_payment))
        .route("/orders/:id/cancel", post(account::cancel_order))
        .route("/appointments", get(account::appointments).post(account::book))
        .route("/appointments/:id/cancel", post(account::cancel_appointment));

    let admin = Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/products", get(admin::products).post(admin::create_product))
        .route("/products/:id", put(admin::update_product).delete(admin::delete_product))
        .route("/products/:id/featured", post(admin::toggle_product_featured))
        .route("/services", get(admin::services).post(admin::create_service))
        .route("/services/:id", put(admin::update_service).delete(admin::delete_service))
        .route("/services/:id/featured", post(admin::toggle_service_featured))
        .route("/categories", get(admin::categories).post(admin::create_category))
        .route("/categories/:id", put(admin::update_category))
        .route("/orders", get(admin::orders))
        .route("/orders/export", get(admin::export_orders))
        .route("/orders/:id", get(admin::order))
        .route("/orders/:id/status", put(admin::update_order_status))
        .route("/orders/:id/cancel", post(admin::cancel_order))
        .route("/orders/:id/refund", post(admin::refund_order))
        .route("/customers", get(admin::customers))
        .route("/customers/export", get(admin::export_customers))
        .route("/customers/:id", get(admin::customer).put(admin::update_customer))
        .route("/staff", post(admin::create_staff))
        .route("/inventory", get(admin::inventory))
        .route("/inventory/low-stock", get(admin::low_stock))
        .route("/inventory/out-of-stock", get(admin::out_of_stock))
        .route("/inventory/export", get(admin::export_inventory))
        .route("/inventory/import", post(admin::import_inventory))
        .route("/inventory/:id/adjust", post(admin::adjust_stock))
        .route("/inventory/:id/history", get(admin::stock_history))
        .route("/reviews", get(admin::reviews))
        .route("/reviews/:id/approve", post(admin::approve_review))
        .route("/reviews/:id/reject", post(admin::reject_review))
        .route("/reviews/:id/respond", post(admin::respond_review))
        .route("/appointments", get(admin::appointments))
        .route("/appointments/:id/status", put(admin::update_appointment_status))
        .route("/reports/sales", get(admin::sales_report))
        .route("/reports/customers", get(admin::customers_report))
        .route("/reports/inventory", get(admin::inventory_report))
        .route("/reports/export/:kind", get(admin::export_report))
        .route("/instagram/account", get(admin::instagram_account))
        .route("/instagram/validate-token", get(admin::instagram_validate_token))
        .route("/instagram/refresh-token", post(admin::instagram_refresh_token))
        .route("/instagram/clear-cache", post(admin::instagram_clear_cache))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", public.merge(customer))
        .nest("/api/v1/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
