//! Public storefront routes.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{Category, CategoryKind, Review, Role, User};
use crate::domain::value_objects::ItemRef;
use crate::http::error::ApiResult;
use crate::http::extract::{ApiJson, ApiQuery};
use crate::http::state::AppState;
use crate::services::catalog::{
    CatalogQuery, CategoryDetail, ProductDetail, ProductView, SearchResults, ServiceDetail, ServiceView,
};
use crate::services::customers::NewCustomer;
use crate::services::instagram::InstagramPost;
use crate::store::Page;

#[derive(Serialize)]
pub struct HomePage {
    pub featured_products: Vec<ProductView>,
    pub featured_services: Vec<ServiceView>,
    pub latest_products: Vec<ProductView>,
    pub testimonials: Vec<Review>,
    pub instagram_posts: Vec<InstagramPost>,
}

pub async fn home(State(state): State<AppState>) -> ApiResult<Json<HomePage>> {
    Ok(Json(HomePage {
        featured_products: state.catalog.featured_products(4).await?,
        featured_services: state.catalog.featured_services(3).await?,
        latest_products: state.catalog.latest_products(8).await?,
        testimonials: state.reviews.testimonials(3).await?,
        instagram_posts: state.instagram.recent_posts(Some(6)).await,
    }))
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> ApiResult<Json<Page<ProductView>>> {
    Ok(Json(state.catalog.list_products(&query).await?))
}

pub async fn featured_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Json<Vec<ProductView>>> {
    Ok(Json(state.catalog.featured_products(query.limit.unwrap_or(8).min(50)).await?))
}

pub async fn product_detail(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<ProductDetail>> {
    Ok(Json(state.catalog.product_detail(&slug).await?))
}

pub async fn list_services(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> ApiResult<Json<Page<ServiceView>>> {
    Ok(Json(state.catalog.list_services(&query).await?))
}

pub async fn featured_services(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Json<Vec<ServiceView>>> {
    Ok(Json(state.catalog.featured_services(query.limit.unwrap_or(6).min(50)).await?))
}

pub async fn service_detail(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<ServiceDetail>> {
    Ok(Json(state.catalog.service_detail(&slug).await?))
}

#[derive(Deserialize)]
pub struct CategoryQuery {
    pub kind: Option<CategoryKind>,
}

pub async fn categories(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CategoryQuery>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.catalog.categories(query.kind).await?))
}

pub async fn category_detail(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<CategoryDetail>> {
    Ok(Json(state.catalog.category_detail(&slug).await?))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search(State(state): State<AppState>, ApiQuery(query): ApiQuery<SearchQuery>) -> ApiResult<Json<SearchResults>> {
    Ok(Json(state.catalog.search(&query.q).await?))
}

pub async fn reviews(State(state): State<AppState>, ApiQuery(target): ApiQuery<ItemRef>) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(state.reviews.approved_for(target).await?))
}

#[derive(Serialize)]
pub struct Esthetician {
    pub id: Uuid,
    pub name: String,
}

pub async fn estheticians(State(state): State<AppState>) -> ApiResult<Json<Vec<Esthetician>>> {
    let staff = state.customers.estheticians().await?;
    Ok(Json(staff.into_iter().map(|u| Esthetician { id: u.id, name: u.name }).collect()))
}

pub async fn instagram_posts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Json<Vec<InstagramPost>> {
    Json(state.instagram.recent_posts(query.limit).await)
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewCustomer>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.customers.register(input, Role::Customer).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn availability(
    State(state): State<AppState>,
    ApiJson(wanted): ApiJson<HashMap<Uuid, u32>>,
) -> ApiResult<Json<HashMap<Uuid, bool>>> {
    Ok(Json(state.inventory.check_availability(&wanted).await?))
}
