//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT` — bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for JSON lines, anything else for text
/// - `DATABASE_URL` — PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `STRIPE_SECRET_KEY` — unset runs on the in-memory payment processor
/// - `STRIPE_API_BASE` — Stripe endpoint (default: `https://api.stripe.com`)
/// - `CHECKOUT_CURRENCY` — currency for payment lines (default: `"usd"`)
/// - `PUBLIC_BASE_URL` — storefront origin for success/cancel redirects
/// - `EMAIL_API_KEY`, `EMAIL_API_BASE`, `EMAIL_FROM` — email provider;
///   unset key logs notifications instead of sending them
/// - `DEDUP_WINDOW_SECS` — reconcile de-duplication window (default: `60`)
/// - `UPSTREAM_TIMEOUT_SECS` — payment and email request timeout (default: `15`)
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub checkout_currency: String,
    pub public_base_url: String,
    pub email_api_key: Option<String>,
    pub email_api_base: String,
    pub email_from: String,
    pub dedup_window: Duration,
    pub upstream_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: Duration| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: get("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match get("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: get("DATABASE_URL"),
            database_max_connections: get("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            checkout_currency: get("CHECKOUT_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or(defaults.checkout_currency),
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            email_api_key: get("EMAIL_API_KEY"),
            email_api_base: get("EMAIL_API_BASE").unwrap_or(defaults.email_api_base),
            email_from: get("EMAIL_FROM").unwrap_or(defaults.email_from),
            dedup_window: secs("DEDUP_WINDOW_SECS", defaults.dedup_window),
            upstream_timeout: secs("UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            stripe_secret_key: None,
            stripe_api_base: checkout::services::stripe::DEFAULT_API_BASE.to_string(),
            checkout_currency: "usd".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            email_api_key: None,
            email_api_base: "https://api.resend.com".to_string(),
            email_from: "orders@localhost".to_string(),
            dedup_window: checkout::DEFAULT_WINDOW,
            upstream_timeout: Duration::from_secs(15),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("addr", &self.addr())
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database_url", &redact(&self.database_url))
            .field("stripe_secret_key", &redact(&self.stripe_secret_key))
            .field("stripe_api_base", &self.stripe_api_base)
            .field("checkout_currency", &self.checkout_currency)
            .field("public_base_url", &self.public_base_url)
            .field("email_api_key", &redact(&self.email_api_key))
            .field("dedup_window", &self.dedup_window)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}
