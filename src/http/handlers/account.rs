//! Routes for the signed-in customer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::{Appointment, Order, Review, User};
use crate::http::error::ApiResult;
use crate::http::extract::{ApiJson, ApiQuery, CurrentCustomer};
use crate::http::state::AppState;
use crate::services::bookings::{AppointmentView, BookingRequest};
use crate::services::cart::{AddToCart, CartView};
use crate::services::checkout::{CheckoutReceipt, CheckoutRequest};
use crate::services::customers::ProfileUpdate;
use crate::services::orders::OrderDetail;
use crate::services::reviews::{NewReview, ReviewInput};
use crate::store::Page;

pub async fn profile(CurrentCustomer(user): CurrentCustomer) -> Json<User> {
    Json(user)
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.customers.update_profile(&user, update).await?))
}

pub async fn cart(State(state): State<AppState>, CurrentCustomer(user): CurrentCustomer) -> ApiResult<Json<CartView>> {
    Ok(Json(state.cart.view(&user).await?))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    ApiJson(input): ApiJson<AddToCart>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.cart.add(&user, input).await?))
}

#[derive(Deserialize)]
pub struct QuantityUpdate {
    pub quantity: u32,
}

pub async fn update_cart_line(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(line_id): Path<Uuid>,
    ApiJson(update): ApiJson<QuantityUpdate>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.cart.update(&user, line_id, update.quantity).await?))
}

pub async fn remove_cart_line(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(line_id): Path<Uuid>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.cart.remove(&user, line_id).await?))
}

pub async fn clear_cart(State(state): State<AppState>, CurrentCustomer(user): CurrentCustomer) -> ApiResult<StatusCode> {
    state.cart.clear(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn checkout(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutReceipt>)> {
    let receipt = state.checkout.checkout(&user, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

pub async fn orders(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Page<Order>>> {
    Ok(Json(state.orders.mine(&user, query.page.unwrap_or(1)).await?))
}

pub async fn order(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(state.orders.detail_for(&user, id).await?))
}

pub async fn order_payment(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(state.orders.payment_status(&user, id).await?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.cancel_for(&user, id).await?))
}

pub async fn my_reviews(State(state): State<AppState>, CurrentCustomer(user): CurrentCustomer) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(state.reviews.mine(&user).await?))
}

pub async fn create_review(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    ApiJson(input): ApiJson<NewReview>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let review = state.reviews.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn update_review(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<ReviewInput>,
) -> ApiResult<Json<Review>> {
    Ok(Json(state.reviews.update(&user, id, input).await?))
}

pub async fn delete_review(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.reviews.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn appointments(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    Ok(Json(state.bookings.mine(&user).await?))
}

pub async fn book(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    ApiJson(request): ApiJson<BookingRequest>,
) -> ApiResult<(StatusCode, Json<AppointmentView>)> {
    let booked = state.bookings.book(&user, request).await?;
    Ok((StatusCode::CREATED, Json(booked)))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    CurrentCustomer(user): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.bookings.cancel_for(&user, id).await?))
}
