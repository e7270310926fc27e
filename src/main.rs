//! LMI Check Server - census tract eligibility backend
//!
//! This is the main entry point for the server. It handles:
//! - LMI eligibility checks by address or coordinates
//! - ESRI geocoding proxy (keeps the API key server side)
//! - Tract income lookups behind the census_cache table
//! - Saved addresses and Stripe subscription billing

mod app;
mod billing;
mod census;
mod config;
mod geocode;
mod http;
mod lmi;
mod store;
mod util;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

/// How often idle per-user rate limit buckets are dropped
const LIMITER_SHRINK_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    // Initialize server time tracking
    init_server_time();

    info!("Starting LMI Check Server");
    info!("Server address: {}", config.server_addr);
    info!(
        esri = config.esri_api_key.is_some(),
        census_key = config.census_api_key.is_some(),
        billing = config.stripe_secret_key.is_some(),
        mock_fallback = config.allow_mock_fallback,
        cache_ttl_days = config.census_cache_ttl_days,
        "Upstream configuration"
    );
    if config.esri_api_key.is_none() {
        warn!("ESRI_API_KEY not set, geocoding will use the Census geocoder only");
    }

    // Create application state
    let state = AppState::new(config.clone());

    let limiter = state.lookup_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_SHRINK_INTERVAL);
        loop {
            interval.tick().await;
            limiter.shrink();
        }
    });

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
