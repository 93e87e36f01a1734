use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::EcommerceError;

/// An [`EcommerceError`] rendered as `{"status":"error","message":...}`.
#[derive(Debug)]
pub struct ApiError(pub EcommerceError);

impl From<EcommerceError> for ApiError {
    fn from(err: EcommerceError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use EcommerceError::*;
        match &self.0 {
            ProductNotFound | ServiceNotFound | CategoryNotFound | OrderNotFound | PaymentNotFound
            | CustomerNotFound | ReviewNotFound | AppointmentNotFound | CartItemNotFound => StatusCode::NOT_FOUND,
            CartEmpty | InsufficientStock { .. } | Unavailable(_) | InvalidQuantity | InvalidTransition { .. }
            | Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Conflict(_) | OrderChanged => StatusCode::CONFLICT,
            Unauthorized => StatusCode::UNAUTHORIZED,
            Forbidden => StatusCode::FORBIDDEN,
            Gateway(_) | Upstream(_) => StatusCode::BAD_GATEWAY,
            StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(error = %self.0, "request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(EcommerceError::OrderNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError(EcommerceError::CartEmpty).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError(EcommerceError::MalformedRequest("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError(EcommerceError::Conflict("sku".into())).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(EcommerceError::OrderChanged).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(EcommerceError::Unauthorized).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError(EcommerceError::Gateway("down".into())).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError(EcommerceError::StorageError("db".into())).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
