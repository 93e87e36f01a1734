//! Salon Commerce
//!
//! Storefront and appointment booking service for a beauty and aesthetics
//! business.
//!
//! ## Features
//! - Product and service catalog with categories
//! - Cart, checkout and order lifecycle
//! - PIX, boleto and card payments through an external gateway
//! - Inventory tracking with an audit log
//! - Reviews, appointment booking and back-office reports
//! - Instagram feed for the home page

#[macro_use]
pub mod domain;

pub mod config;
pub mod error;
pub mod http;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{EcommerceError, Result};
pub use http::{create_router, AppState};
