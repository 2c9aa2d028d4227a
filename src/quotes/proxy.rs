//! Quote Proxy Client
//!
//! `GET {base}/{SYMBOL}/quote` returns either a quote object
//! (`{"symbol": "GOOG", "latestPrice": 123.4, ...}`) or a bare JSON string
//! such as `"Unknown symbol"` when the ticker cannot be resolved.

use crate::models::QuoteResult;
use crate::quotes::{QuoteFetcher, QuoteLookup};
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct QuoteProxyClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ProxyQuote {
    symbol: Option<String>,
    #[serde(rename = "latestPrice")]
    latest_price: Option<f64>,
}

impl QuoteProxyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build QuoteProxyClient")?;

        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .with_context(|| format!("Invalid quote proxy URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Quote proxy URL cannot be a base: {}", base_url));
        }

        Ok(Self { client, base_url })
    }

    /// Build the quote URL for an already-uppercased symbol.
    fn quote_url(&self, symbol: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Quote proxy URL cannot be a base"))?
            .pop_if_empty()
            .push(symbol)
            .push("quote");
        Ok(url)
    }

    async fn request(&self, url: Url) -> Result<Value> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("GET {} {}: {}", url, status, text));
        }

        resp.json::<Value>()
            .await
            .context("Failed to parse quote response")
    }
}

#[async_trait::async_trait]
impl QuoteFetcher for QuoteProxyClient {
    async fn fetch(&self, symbol: &str) -> QuoteLookup {
        let symbol = symbol.trim().to_uppercase();
        let url = match self.quote_url(&symbol) {
            Ok(url) => url,
            Err(e) => {
                warn!(symbol = %symbol, "Failed to build quote URL: {}", e);
                return QuoteLookup::Unavailable;
            }
        };

        let start = Instant::now();
        match self.request(url).await {
            Ok(payload) => {
                let lookup = classify_payload(payload);
                debug!(
                    symbol = %symbol,
                    latency_ms = start.elapsed().as_millis() as u64,
                    outcome = ?lookup,
                    "Quote proxy responded"
                );
                lookup
            }
            Err(e) => {
                warn!(
                    symbol = %symbol,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Quote proxy unavailable: {:#}",
                    e
                );
                QuoteLookup::Unavailable
            }
        }
    }
}

/// Decide what a proxy payload means.
///
/// A bare string is the proxy's "unknown symbol" signal. An object without
/// both `symbol` and `latestPrice` carries no usable quote for the ticker.
pub(crate) fn classify_payload(payload: Value) -> QuoteLookup {
    match payload {
        Value::String(message) => {
            debug!(message = %message, "Quote proxy rejected symbol");
            QuoteLookup::InvalidSymbol
        }
        Value::Object(_) => match serde_json::from_value::<ProxyQuote>(payload) {
            Ok(ProxyQuote {
                symbol: Some(symbol),
                latest_price: Some(price),
            }) if !symbol.trim().is_empty() => QuoteLookup::Quote(QuoteResult {
                symbol: symbol.trim().to_uppercase(),
                price,
            }),
            Ok(_) => QuoteLookup::InvalidSymbol,
            Err(e) => {
                warn!("Malformed quote object: {}", e);
                QuoteLookup::Unavailable
            }
        },
        other => {
            warn!(payload = %other, "Unexpected quote payload");
            QuoteLookup::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn fake_proxy(Path(symbol): Path<String>) -> axum::response::Response {
        match symbol.as_str() {
            "GOOG" => Json(json!({"symbol": "GOOG", "latestPrice": 135.6, "open": 134.0}))
                .into_response(),
            "BRK.B" => Json(json!({"symbol": "brk.b", "latestPrice": 412.25})).into_response(),
            "NOPRICE" => Json(json!({"symbol": "NOPRICE", "latestPrice": null})).into_response(),
            "DOWN" => (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response(),
            "SLOW" => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"symbol": "SLOW", "latestPrice": 1.0})).into_response()
            }
            _ => Json(json!("Unknown symbol")).into_response(),
        }
    }

    async fn spawn_fake_proxy() -> String {
        let app = Router::new().route("/v1/stock/:symbol/quote", get(fake_proxy));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/stock", addr)
    }

    async fn client() -> QuoteProxyClient {
        let base = spawn_fake_proxy().await;
        QuoteProxyClient::new(&base, Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_quote_url_encodes_symbol() {
        let client =
            QuoteProxyClient::new("https://proxy.example/v1/stock/", Duration::from_secs(1))
                .unwrap();
        let url = client.quote_url("GOOG").unwrap();
        assert_eq!(url.as_str(), "https://proxy.example/v1/stock/GOOG/quote");

        let url = client.quote_url("A/B C").unwrap();
        assert_eq!(url.as_str(), "https://proxy.example/v1/stock/A%2FB%20C/quote");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(QuoteProxyClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(QuoteProxyClient::new("mailto:quotes@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_classify_payload() {
        assert_eq!(
            classify_payload(json!({"symbol": "msft", "latestPrice": 410.5})),
            QuoteLookup::Quote(QuoteResult {
                symbol: "MSFT".to_string(),
                price: 410.5
            })
        );
        assert_eq!(
            classify_payload(json!("Invalid symbol")),
            QuoteLookup::InvalidSymbol
        );
        assert_eq!(
            classify_payload(json!({"symbol": "X"})),
            QuoteLookup::InvalidSymbol
        );
        assert_eq!(
            classify_payload(json!({"symbol": "X", "latestPrice": "12.3"})),
            QuoteLookup::Unavailable
        );
        assert_eq!(classify_payload(json!(null)), QuoteLookup::Unavailable);
        assert_eq!(classify_payload(json!([1, 2])), QuoteLookup::Unavailable);
    }

    #[tokio::test]
    async fn test_fetch_quote() {
        let client = client().await;

        let lookup = client.fetch("goog").await;
        assert_eq!(
            lookup,
            QuoteLookup::Quote(QuoteResult {
                symbol: "GOOG".to_string(),
                price: 135.6
            })
        );

        let quote = client.fetch("brk.b").await.into_quote().unwrap();
        assert_eq!(quote.symbol, "BRK.B");
        assert_eq!(quote.price, 412.25);
    }

    #[tokio::test]
    async fn test_fetch_unknown_symbol() {
        let client = client().await;

        assert_eq!(client.fetch("NOTASYMBOL").await, QuoteLookup::InvalidSymbol);
        assert_eq!(client.fetch("noprice").await, QuoteLookup::InvalidSymbol);
        // Encoded as a single path segment, so the proxy sees it as a ticker
        assert_eq!(client.fetch("a/b").await, QuoteLookup::InvalidSymbol);
    }

    #[tokio::test]
    async fn test_fetch_upstream_failures() {
        let client = client().await;

        assert_eq!(client.fetch("DOWN").await, QuoteLookup::Unavailable);
        assert_eq!(client.fetch("SLOW").await, QuoteLookup::Unavailable);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = QuoteProxyClient::new(
            &format!("http://{}/v1/stock", addr),
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(client.fetch("GOOG").await, QuoteLookup::Unavailable);
    }
}
