//! `console-backend`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise telemetry (JSON logs, optional OTLP spans).
//! 3. Load the envelope key ring and the administrator account.
//! 4. Build the Axum router and serve it, over TLS when configured.

use anyhow::{Context, Result};
use tracing::info;

use backend::config::Config;
use backend::server::{self, state::AppState};
use backend::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        tls = cfg.tls_paths().is_some(),
        "console-backend starting"
    );

    // -----------------------------------------------------------------------
    // 3. Keys and accounts
    // -----------------------------------------------------------------------
    let state = AppState::from_config(&cfg)?;

    // -----------------------------------------------------------------------
    // 4. HTTP(S) server
    // -----------------------------------------------------------------------
    let router = server::router::build(state);
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    match cfg.tls_paths() {
        Some((cert, key)) => {
            let tls = server::tls::load_server_config(cert, key)?;
            server::tls::serve(listener, tls, router, shutdown_signal()).await?;
        }
        None => {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    info!("console-backend stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
