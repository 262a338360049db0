//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::SagaConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `"text"`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on in-memory stores
/// - `CATALOG_URL`: product service base URL; unset uses an in-memory catalog
/// - `SERVICE_NAME` / `SERVICE_SECRET`: credentials sent to the catalog
/// - `CATALOG_TIMEOUT_MS` (default: `5000`), `CART_TIMEOUT_MS` (default: `10000`),
///   `EVENT_TIMEOUT_MS` (default: `5000`)
/// - `CURRENCY` (default: `"IDR"`)
/// - `REJECT_EMPTY_CHECKOUT` (default: `false`)
/// - `OUTBOX_POLL_INTERVAL_MS` (default: `1000`), `OUTBOX_MAX_ATTEMPTS` (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub catalog_url: Option<String>,
    pub service_name: String,
    pub service_secret: String,
    pub catalog_timeout: Duration,
    pub cart_timeout: Duration,
    pub event_timeout: Duration,
    pub currency: String,
    pub reject_empty_checkout: bool,
    pub outbox_poll_interval: Duration,
    pub outbox_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: Duration| {
            non_empty(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: non_empty("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: non_empty("DATABASE_URL"),
            catalog_url: non_empty("CATALOG_URL"),
            service_name: non_empty("SERVICE_NAME").unwrap_or(defaults.service_name),
            service_secret: non_empty("SERVICE_SECRET").unwrap_or_default(),
            catalog_timeout: millis("CATALOG_TIMEOUT_MS", defaults.catalog_timeout),
            cart_timeout: millis("CART_TIMEOUT_MS", defaults.cart_timeout),
            event_timeout: millis("EVENT_TIMEOUT_MS", defaults.event_timeout),
            currency: non_empty("CURRENCY").unwrap_or(defaults.currency),
            reject_empty_checkout: non_empty("REJECT_EMPTY_CHECKOUT")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            outbox_poll_interval: millis("OUTBOX_POLL_INTERVAL_MS", defaults.outbox_poll_interval),
            outbox_max_attempts: non_empty("OUTBOX_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.outbox_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the settings the saga services need.
    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            catalog_timeout: self.catalog_timeout,
            cart_timeout: self.cart_timeout,
            event_timeout: self.event_timeout,
            currency: self.currency.clone(),
            reject_empty_checkout: self.reject_empty_checkout,
            outbox_max_attempts: self.outbox_max_attempts,
            outbox_poll_interval: self.outbox_poll_interval,
            ..SagaConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let saga = SagaConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            catalog_url: None,
            service_name: "cart-order-service".to_string(),
            service_secret: String::new(),
            catalog_timeout: saga.catalog_timeout,
            cart_timeout: saga.cart_timeout,
            event_timeout: saga.event_timeout,
            currency: saga.currency,
            reject_empty_checkout: saga.reject_empty_checkout,
            outbox_poll_interval: saga.outbox_poll_interval,
            outbox_max_attempts: saga.outbox_max_attempts,
        }
    }
}
