//! Environment-driven configuration.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub app_env: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub admin_api_token: String,
    pub log_format: LogFormat,
    pub shop: ShopConfig,
    pub payment: PaymentConfig,
    pub instagram: InstagramConfig,
}

#[derive(Clone, Debug)]
pub struct ShopConfig {
    pub shipping_flat_fee: Decimal,
    pub low_stock_threshold: i32,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub api_url: String,
    pub api_key: String,
    pub webhook_secret: Option<String>,
    pub notification_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct InstagramConfig {
    pub api_url: String,
    pub access_token: String,
    pub user_id: String,
    pub cache_minutes: u64,
    pub verify_token: Option<String>,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid { key: "LOG_FORMAT", value: other.to_string() })
            }
        };

        Ok(Self {
            port: parse_or(&get, "PORT", 8083)?,
            app_env: get("APP_ENV").unwrap_or_else(|| "production".to_string()),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            nats_url: get("NATS_URL"),
            admin_api_token: get("ADMIN_API_TOKEN").ok_or(ConfigError::Missing("ADMIN_API_TOKEN"))?,
            log_format,
            shop: ShopConfig {
                shipping_flat_fee: parse_or(&get, "SHIPPING_FLAT_FEE", Decimal::ZERO)?,
                low_stock_threshold: parse_or(&get, "LOW_STOCK_THRESHOLD", 5)?,
            },
            payment: PaymentConfig {
                api_url: get("PAYMENT_API_URL")
                    .unwrap_or_else(|| "https://api.mercadopago.com/v1".to_string()),
                api_key: get("PAYMENT_API_KEY").unwrap_or_default(),
                webhook_secret: get("PAYMENT_WEBHOOK_SECRET"),
                notification_url: get("PAYMENT_NOTIFICATION_URL"),
            },
            instagram: InstagramConfig {
                api_url: get("INSTAGRAM_API_URL")
                    .unwrap_or_else(|| "https://graph.instagram.com".to_string()),
                access_token: get("INSTAGRAM_ACCESS_TOKEN").unwrap_or_default(),
                user_id: get("INSTAGRAM_USER_ID").unwrap_or_default(),
                cache_minutes: parse_or(&get, "INSTAGRAM_CACHE_MINUTES", 60)?,
                verify_token: get("INSTAGRAM_VERIFY_TOKEN"),
            },
        })
    }

    pub fn is_local(&self) -> bool {
        self.app_env == "local"
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
