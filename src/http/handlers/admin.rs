//! Back-office routes. Every handler here sits behind `require_admin`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::aggregates::{
    Appointment, AppointmentStatus, Category, InventoryLog, Order, Payment, Product, Review, ReviewStatus, Role, User,
};
use crate::http::error::ApiResult;
use crate::http::extract::{ApiJson, ApiQuery};
use crate::http::handlers::csv_attachment;
use crate::http::state::AppState;
use crate::services::bookings::AppointmentView;
use crate::services::catalog::{CatalogQuery, CategoryInput, ProductInput, ProductView, ServiceInput, ServiceView};
use crate::services::customers::{CustomerDetail, CustomerSummary, NewCustomer, ProfileUpdate};
use crate::services::inventory::{AdjustRequest, AdjustResult, ImportReport, InventoryQuery, StockRow};
use crate::services::orders::{OrderDetail, OrderSearch, StatusUpdate};
use crate::services::reports::{CustomersReport, Dashboard, InventoryReport, PeriodQuery, ReportKind, SalesReport};
use crate::store::Page;

const ACTOR: &str = "admin";

fn actor() -> Option<String> {
    Some(ACTOR.to_string())
}

pub async fn dashboard(State(state): State<AppState>, ApiQuery(query): ApiQuery<PeriodQuery>) -> ApiResult<Json<Dashboard>> {
    Ok(Json(state.reports.dashboard(&query).await?))
}

// products

pub async fn products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> ApiResult<Json<Page<ProductView>>> {
    Ok(Json(state.catalog.admin_products(&query).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<(StatusCode, Json<ProductView>)> {
    let product = state.catalog.create_product(input, actor()).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<Json<ProductView>> {
    Ok(Json(state.catalog.update_product(id, input).await?))
}

pub async fn delete_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_product_featured(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ProductView>> {
    Ok(Json(state.catalog.toggle_product_featured(id).await?))
}

// services

pub async fn services(State(state): State<AppState>) -> ApiResult<Json<Vec<ServiceView>>> {
    Ok(Json(state.catalog.admin_services().await?))
}

pub async fn create_service(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ServiceInput>,
) -> ApiResult<(StatusCode, Json<ServiceView>)> {
    let service = state.catalog.create_service(input).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<ServiceInput>,
) -> ApiResult<Json<ServiceView>> {
    Ok(Json(state.catalog.update_service(id, input).await?))
}

pub async fn delete_service(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.catalog.delete_service(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_service_featured(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ServiceView>> {
    Ok(Json(state.catalog.toggle_service_featured(id).await?))
}

// categories

pub async fn categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.catalog.all_categories().await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state.catalog.create_category(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> ApiResult<Json<Category>> {
    Ok(Json(state.catalog.update_category(id, input).await?))
}

// orders

pub async fn orders(State(state): State<AppState>, ApiQuery(search): ApiQuery<OrderSearch>) -> ApiResult<Json<Page<Order>>> {
    Ok(Json(state.orders.admin_list(&search).await?))
}

pub async fn export_orders(State(state): State<AppState>, ApiQuery(search): ApiQuery<OrderSearch>) -> ApiResult<Response> {
    let body = state.orders.export_csv(&search).await?;
    Ok(csv_attachment(&format!("orders-{}.csv", Utc::now().format("%Y-%m-%d")), body))
}

pub async fn order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(state.orders.admin_detail(id).await?))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.update_status(id, update).await?))
}

pub async fn cancel_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.admin_cancel(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<Decimal>,
}

pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<RefundRequest>,
) -> ApiResult<Json<Payment>> {
    Ok(Json(state.payments.refund(id, request.amount).await?))
}

// customers and staff

#[derive(Deserialize)]
pub struct CustomerQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
}

pub async fn customers(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CustomerQuery>,
) -> ApiResult<Json<Page<CustomerSummary>>> {
    Ok(Json(state.customers.admin_list(query.q.as_deref(), query.page.unwrap_or(1)).await?))
}

pub async fn export_customers(State(state): State<AppState>) -> ApiResult<Response> {
    let body = state.customers.export_csv().await?;
    Ok(csv_attachment(&format!("customers-{}.csv", Utc::now().format("%Y-%m-%d")), body))
}

pub async fn customer(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<CustomerDetail>> {
    Ok(Json(state.customers.admin_detail(id).await?))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.customers.admin_update(id, update).await?))
}

pub async fn create_staff(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewCustomer>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let staff = state.customers.register(input, Role::Admin).await?;
    Ok((StatusCode::CREATED, Json(staff)))
}

// inventory

pub async fn inventory(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<InventoryQuery>,
) -> ApiResult<Json<Page<StockRow>>> {
    Ok(Json(state.inventory.list(&query).await?))
}

#[derive(Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<i32>,
}

pub async fn low_stock(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ThresholdQuery>,
) -> ApiResult<Json<Value>> {
    let threshold = query.threshold.unwrap_or_else(|| state.inventory.default_threshold());
    let products = state.inventory.low_stock(Some(threshold)).await?;
    Ok(Json(json!({ "threshold": threshold, "products": products })))
}

pub async fn out_of_stock(State(state): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.inventory.out_of_stock().await?))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<AdjustRequest>,
) -> ApiResult<Json<AdjustResult>> {
    Ok(Json(state.inventory.adjust(id, request, actor()).await?))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn stock_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Json<Vec<InventoryLog>>> {
    Ok(Json(state.inventory.history(id, query.limit).await?))
}

pub async fn export_inventory(State(state): State<AppState>) -> ApiResult<Response> {
    let body = state.inventory.export_csv().await?;
    Ok(csv_attachment(&format!("stock-{}.csv", Utc::now().format("%Y-%m-%d")), body))
}

/// Raw CSV body with `sku,stock` columns.
pub async fn import_inventory(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ImportReport>> {
    Ok(Json(state.inventory.import_csv(&body, actor()).await?))
}

// reviews

#[derive(Deserialize)]
pub struct ReviewQuery {
    pub status: Option<ReviewStatus>,
    pub page: Option<u32>,
}

pub async fn reviews(State(state): State<AppState>, ApiQuery(query): ApiQuery<ReviewQuery>) -> ApiResult<Json<Page<Review>>> {
    Ok(Json(state.reviews.admin_list(query.status, query.page.unwrap_or(1)).await?))
}

pub async fn approve_review(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Review>> {
    Ok(Json(state.reviews.approve(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

pub async fn reject_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<RejectRequest>,
) -> ApiResult<Json<Review>> {
    Ok(Json(state.reviews.reject(id, request.reason).await?))
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub response: String,
}

pub async fn respond_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<RespondRequest>,
) -> ApiResult<Json<Review>> {
    Ok(Json(state.reviews.respond(id, request.response).await?))
}

// appointments

#[derive(Deserialize)]
pub struct AppointmentQuery {
    pub date: Option<NaiveDate>,
}

pub async fn appointments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AppointmentQuery>,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    Ok(Json(state.bookings.admin_list(query.date).await?))
}

#[derive(Deserialize)]
pub struct AppointmentStatusUpdate {
    pub status: AppointmentStatus,
}

pub async fn update_appointment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(update): ApiJson<AppointmentStatusUpdate>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.bookings.set_status(id, update.status).await?))
}

// reports

pub async fn sales_report(State(state): State<AppState>, ApiQuery(query): ApiQuery<PeriodQuery>) -> ApiResult<Json<SalesReport>> {
    Ok(Json(state.reports.sales(&query).await?))
}

pub async fn customers_report(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<Json<CustomersReport>> {
    Ok(Json(state.reports.customers(&query).await?))
}

pub async fn inventory_report(State(state): State<AppState>) -> ApiResult<Json<InventoryReport>> {
    Ok(Json(state.reports.inventory().await?))
}

pub async fn export_report(
    State(state): State<AppState>,
    Path(kind): Path<ReportKind>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<Response> {
    let (filename, body) = state.reports.export(kind, &query).await?;
    Ok(csv_attachment(&filename, body))
}

// instagram

pub async fn instagram_account(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "account": state.instagram.account_info().await }))
}

pub async fn instagram_validate_token(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "valid": state.instagram.validate_token().await }))
}

pub async fn instagram_refresh_token(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "refreshed": state.instagram.refresh_token().await }))
}

pub async fn instagram_clear_cache(State(state): State<AppState>) -> StatusCode {
    state.instagram.clear_cache().await;
    StatusCode::NO_CONTENT
}
