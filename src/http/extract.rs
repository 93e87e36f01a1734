use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::domain::aggregates::User;
use crate::error::EcommerceError;

pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// JSON body whose parse failures answer 400 in the API's error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(EcommerceError::MalformedRequest(rejection.body_text()))),
        }
    }
}

pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(EcommerceError::MalformedRequest(rejection.body_text()))),
        }
    }
}

/// The active customer named by the `X-Customer-Id` header.
pub struct CurrentCustomer(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentCustomer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(CUSTOMER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(ApiError(EcommerceError::Unauthorized))?;
        Ok(Self(state.customers.authenticate(id).await?))
    }
}

/// Guards the admin routes with `Authorization: Bearer <ADMIN_API_TOKEN>`.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match token {
        None => Err(ApiError(EcommerceError::Unauthorized)),
        Some(token) if bool::from(token.as_bytes().ct_eq(state.config.admin_api_token.as_bytes())) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!(path = %request.uri().path(), "admin request with wrong token");
            Err(ApiError(EcommerceError::Forbidden))
        }
    }
}
