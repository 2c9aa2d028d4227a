use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_QUOTE_PROXY_URL: &str =
    "https://stock-price-checker-proxy.freecodecamp.rocks/v1/stock";

/// Persisted like counter for one ticker symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockRecord {
    /// Canonical uppercase ticker, unique per record
    pub symbol: String,
    pub likes: u64,
    /// Anonymization tokens of callers that already liked this stock
    #[serde(skip_serializing)]
    pub liked_hashes: HashSet<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StockRecord {
    pub fn has_liked(&self, token: &str) -> bool {
        self.liked_hashes.contains(token)
    }
}

/// Latest quote as reported by the upstream proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    pub symbol: String,
    pub price: f64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub quote_proxy_url: String,
    pub quote_timeout: Duration,
    /// Take the caller address from `X-Forwarded-For` instead of the socket peer
    pub trust_proxy: bool,
    pub ip_hash_salt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_path: "stock_prices.db".to_string(),
            quote_proxy_url: DEFAULT_QUOTE_PROXY_URL.to_string(),
            quote_timeout: Duration::from_secs(10),
            trust_proxy: false,
            ip_hash_salt: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.host);

        let port = parse_or_default("PORT", std::env::var("PORT").ok(), defaults.port);

        let database_path = std::env::var("DB_PATH")
            .or_else(|_| std::env::var("DATABASE_PATH"))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.database_path);

        let quote_proxy_url = std::env::var("QUOTE_PROXY_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.quote_proxy_url);

        let timeout_secs = parse_or_default(
            "QUOTE_TIMEOUT_SECS",
            std::env::var("QUOTE_TIMEOUT_SECS").ok(),
            defaults.quote_timeout.as_secs(),
        );

        let trust_proxy = std::env::var("TRUST_PROXY")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.trust_proxy);

        let ip_hash_salt = std::env::var("IP_HASH_SALT").unwrap_or_default();

        Ok(Self {
            host,
            port,
            database_path,
            quote_proxy_url,
            quote_timeout: Duration::from_secs(timeout_secs.max(1)),
            trust_proxy,
            ip_hash_salt,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn parse_or_default<T: std::str::FromStr + Copy>(name: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(var = name, value = %raw, "Invalid value, falling back to default");
            default
        }
    }
}
