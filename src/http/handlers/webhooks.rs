use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::error::EcommerceError;
use crate::http::error::{ApiError, ApiResult};
use crate::http::extract::ApiQuery;
use crate::http::state::AppState;
use crate::services::payments::webhook::SIGNATURE_HEADER;
use crate::services::payments::WebhookPayload;

/// Gateway notifications. The signature covers the raw body, so it is read before parsing.
pub async fn payment(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    state.webhooks.verify(&body, signature)?;

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError(EcommerceError::MalformedRequest(format!("invalid webhook body: {e}"))))?;
    let outcome = state.payments.handle_webhook(payload).await?;
    info!(outcome = ?outcome, "payment webhook processed");
    Ok(Json(json!({
        "status": "success",
        "message": outcome.message(),
        "result": outcome,
    })))
}

#[derive(Deserialize)]
pub struct Subscription {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Subscription handshake: echoes `hub.challenge` when the verify token matches.
pub async fn instagram_verify(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<Subscription>,
) -> ApiResult<String> {
    let expected = state.config.instagram.verify_token.as_deref().unwrap_or_default();
    let matches = !expected.is_empty()
        && query.mode.as_deref() == Some("subscribe")
        && query
            .verify_token
            .as_deref()
            .is_some_and(|t| bool::from(t.as_bytes().ct_eq(expected.as_bytes())));
    match (matches, query.challenge) {
        (true, Some(challenge)) => Ok(challenge),
        _ => {
            warn!("instagram webhook verification failed");
            Err(ApiError(EcommerceError::Unauthorized))
        }
    }
}

/// Any change notification invalidates the cached feed.
pub async fn instagram_update(State(state): State<AppState>) -> StatusCode {
    state.instagram.clear_cache().await;
    StatusCode::OK
}
