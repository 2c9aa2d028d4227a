//! Stock Price Checker
//! Serves latest stock quotes alongside a community like counter.

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stock_price_checker::{
    anonymizer::IpAnonymizer,
    api::{app_router, StockApiState},
    models::Config,
    processor::StockProcessor,
    quotes::QuoteProxyClient,
    store::StockStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;

    info!("🚀 Stock Price Checker starting");

    let store = Arc::new(
        StockStore::new(&config.database_path)
            .with_context(|| format!("Failed to open stock store at {}", config.database_path))?,
    );
    info!("📊 Database initialized at: {}", config.database_path);
    match store.len().await {
        Ok(count) => info!("💾 Existing stock records: {}", count),
        Err(e) => warn!("Failed to count stock records: {}", e),
    }

    let quotes = QuoteProxyClient::new(&config.quote_proxy_url, config.quote_timeout)?;
    info!(
        url = %config.quote_proxy_url,
        timeout_secs = config.quote_timeout.as_secs(),
        "Quote proxy configured"
    );

    let state = StockApiState {
        processor: StockProcessor::new(
            Arc::new(quotes),
            store.clone(),
            IpAnonymizer::new(config.ip_hash_salt.clone()),
        ),
        trust_proxy: config.trust_proxy,
    };
    if config.trust_proxy {
        info!("Caller addresses taken from X-Forwarded-For");
    }

    let app = app_router(state);

    // Start server
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    store.close().await.context("Failed to close stock store")?;
    info!("Stock Price Checker stopped");

    Ok(())
}

/// Initialize tracing with an env-configurable filter
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_price_checker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate directory (common when running with --manifest-path from elsewhere)
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
