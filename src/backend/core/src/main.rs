//! Bazaar Server - Main entry point
//!
//! Runs the background job system and its HTTP status endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bazaar_core::{
    api::{self, AppState},
    config::Config,
    jobs::JobSystem,
    telemetry::{self, mask_secret},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    let telemetry = telemetry::init_telemetry(&config.telemetry)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        storage_key = %mask_secret(config.storage.service_key.as_deref().unwrap_or_default()),
        email_key = %mask_secret(config.email.api_key.as_deref().unwrap_or_default()),
        "Starting Bazaar Server"
    );

    // Build the job system before serving any traffic
    let jobs = Arc::new(JobSystem::from_config(&config).context("Failed to build job system")?);
    jobs.start().await.context("Failed to start job system")?;

    let app = api::build_router(AppState::new(jobs.clone(), telemetry.metrics.clone()));

    let ip: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server host: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.shutdown().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
