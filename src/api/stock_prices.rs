//! Stock Prices API
//!
//! `GET /api/stock-prices?stock=GOOG[&stock=MSFT][&like=true]`
//!
//! Validation failures and unknown symbols are reported with HTTP 200 and an
//! `error` field; only store failures produce a 500.

use crate::processor::{StockOutcome, StockProcessor, StockSnapshot};
use crate::store::StoreError;
use axum::{
    extract::{ConnectInfo, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::{Query, QueryRejection};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, error};

pub const INVALID_STOCK: &str = "invalid stock";
pub const TOO_MANY_STOCKS: &str = "please provide exactly 2 stock symbols";
pub const INVALID_SYMBOL: &str = "invalid symbol";
pub const INVALID_PAIR: &str = "one or more stock symbols are invalid";
pub const INTERNAL_ERROR: &str = "internal server error";

/// Shared state for the stock prices API.
#[derive(Clone)]
pub struct StockApiState {
    pub processor: StockProcessor,
    /// Identify callers by the first `X-Forwarded-For` entry
    pub trust_proxy: bool,
}

/// Query parameters. `stock` may repeat.
#[derive(Debug, Default, Deserialize)]
pub struct StockPricesQuery {
    #[serde(default)]
    pub stock: Vec<String>,
    pub like: Option<String>,
}

impl StockPricesQuery {
    /// Trimmed, non-blank symbols in request order.
    pub fn symbols(&self) -> Vec<&str> {
        self.stock
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn wants_like(&self) -> bool {
        self.like
            .as_deref()
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
pub struct StockDataResponse<T> {
    #[serde(rename = "stockData")]
    pub stock_data: T,
}

/// Single-symbol payload
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StockData {
    Quote {
        stock: String,
        price: f64,
        likes: u64,
    },
    Invalid {
        error: &'static str,
        likes: u64,
    },
}

/// One side of a two-symbol comparison
#[derive(Debug, Serialize)]
pub struct RelativeStockData {
    pub stock: String,
    pub price: f64,
    pub rel_likes: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

/// Create the stock prices router.
pub fn stock_prices_router() -> Router<StockApiState> {
    Router::new().route("/api/stock-prices", get(get_stock_prices))
}

/// Stock prices endpoint - GET /api/stock-prices
pub async fn get_stock_prices(
    AxumState(state): AxumState<StockApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Result<Query<StockPricesQuery>, QueryRejection>,
) -> Result<Response, StockApiError> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            debug!("Rejected stock query: {}", rejection);
            return Ok(error_response(INVALID_STOCK));
        }
    };

    let symbols = query.symbols();
    let like = query.wants_like();
    let caller = client_ip(peer, &headers, state.trust_proxy);

    match symbols.as_slice() {
        [] => Ok(error_response(INVALID_STOCK)),
        [symbol] => single_stock(&state.processor, symbol, like, &caller).await,
        [first, second] => stock_pair(&state.processor, first, second, like, &caller).await,
        _ => Ok(error_response(TOO_MANY_STOCKS)),
    }
}

async fn single_stock(
    processor: &StockProcessor,
    symbol: &str,
    like: bool,
    caller: &str,
) -> Result<Response, StockApiError> {
    let stock_data = match processor.process(symbol, like, Some(caller)).await? {
        StockOutcome::Found(snapshot) => StockData::Quote {
            stock: snapshot.symbol,
            price: snapshot.price,
            likes: snapshot.likes,
        },
        StockOutcome::InvalidSymbol => StockData::Invalid {
            error: INVALID_SYMBOL,
            likes: 0,
        },
    };

    Ok(Json(StockDataResponse { stock_data }).into_response())
}

async fn stock_pair(
    processor: &StockProcessor,
    first: &str,
    second: &str,
    like: bool,
    caller: &str,
) -> Result<Response, StockApiError> {
    let (first, second) = tokio::join!(
        processor.process(first, like, Some(caller)),
        processor.process(second, like, Some(caller)),
    );

    match (first?, second?) {
        (StockOutcome::Found(a), StockOutcome::Found(b)) => {
            let stock_data = relative_likes(a, b);
            Ok(Json(StockDataResponse { stock_data }).into_response())
        }
        _ => Ok(error_response(INVALID_PAIR)),
    }
}

/// Pair two snapshots, replacing absolute likes with the difference to the
/// other side. The two `rel_likes` always sum to zero.
pub fn relative_likes(a: StockSnapshot, b: StockSnapshot) -> [RelativeStockData; 2] {
    let diff = a.likes as i64 - b.likes as i64;
    [
        RelativeStockData {
            stock: a.symbol,
            price: a.price,
            rel_likes: diff,
        },
        RelativeStockData {
            stock: b.symbol,
            price: b.price,
            rel_likes: -diff,
        },
    ]
}

/// Caller address used for like deduplication.
pub fn client_ip(peer: SocketAddr, headers: &HeaderMap, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

fn error_response(error: &'static str) -> Response {
    Json(ErrorResponse { error }).into_response()
}

/// Stock API errors
#[derive(Debug)]
pub enum StockApiError {
    Store(StoreError),
}

impl From<StoreError> for StockApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for StockApiError {
    fn into_response(self) -> Response {
        match self {
            StockApiError::Store(e) => error!("Stock store failure: {}", e),
        }

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: INTERNAL_ERROR,
            }),
        )
            .into_response()
    }
}
