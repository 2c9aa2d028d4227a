pub mod stock_prices;

pub use stock_prices::{stock_prices_router, StockApiState};

use crate::middleware::request_logging;
use axum::{http::StatusCode, middleware, routing::get, Router};
use tower_http::cors::CorsLayer;

/// Full application router: stock prices API, health check and a plain-text 404.
pub fn app_router(state: StockApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(stock_prices_router())
        .fallback(not_found)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "Stock Price Checker Operational"
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
