pub mod account;
pub mod admin;
pub mod health;
pub mod storefront;
pub mod webhooks;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// Sends `body` as a downloadable CSV file.
pub(crate) fn csv_attachment(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response()
}
