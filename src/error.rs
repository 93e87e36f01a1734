//! Crate-wide error type.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Customer not found")]
    CustomerNotFound,

    #[error("Review not found")]
    ReviewNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Cart item not found")]
    CartItemNotFound,

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: i32,
    },

    #[error("Item unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Order was changed by another request")]
    OrderChanged,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<sqlx::Error> for EcommerceError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return EcommerceError::Conflict(db.message().to_string());
            }
        }
        EcommerceError::StorageError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(err: validator::ValidationErrors) -> Self {
        EcommerceError::Validation(err.to_string())
    }
}

impl From<csv::Error> for EcommerceError {
    fn from(err: csv::Error) -> Self {
        EcommerceError::Validation(format!("csv: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
