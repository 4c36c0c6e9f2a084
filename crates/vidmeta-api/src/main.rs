//! vidmeta API server.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidmeta_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("rustls crypto provider already installed"))?;

    init_tracing();

    let config = ApiConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        upload_dir = %config.upload_dir.display(),
        "Starting vidmeta-api"
    );

    let state = AppState::new(config.clone())
        .await
        .context("failed to build application state")?;
    info!(
        analyses = ?state.orchestrator.supported_analysis_types(),
        "Analyzers registered"
    );

    let metrics_handle = metrics_enabled().then(metrics::init_metrics);
    if metrics_handle.is_some() {
        info!("Prometheus metrics exposed at /metrics");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Accepting uploads");

    axum::serve(listener, create_router(state, metrics_handle))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Running analyses are dropped with the runtime; their jobs stay `processing`.
    info!("Server stopped");
    Ok(())
}

/// JSON lines when `LOG_FORMAT=json`, coloured text otherwise.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vidmeta=info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(true))
            .init();
    }
}

fn metrics_enabled() -> bool {
    std::env::var("METRICS_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining requests");
}
