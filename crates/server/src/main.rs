// crates/server/src/main.rs
//! Longrun server binary.
//!
//! Parses configuration, installs tracing and metrics, starts the job worker
//! and notification dispatcher, then serves HTTP until Ctrl-C. On shutdown the
//! worker cancels in-flight jobs and their final events are routed before exit.

use anyhow::{Context, Result};
use clap::Parser;
use longrun_core::CancellationToken;
use longrun_observability::init_tracing;
use longrun_server::{cors_layer, create_app_with_cors, init_metrics, ServerConfig, Services};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    let _log_guard = init_tracing(&config.log_config())?;
    init_metrics();

    let worker_config = config.worker_config();
    worker_config.validate()?;

    let shutdown = CancellationToken::new();
    let services = Services::start(worker_config, shutdown.clone());
    let app = create_app_with_cors(
        services.state.clone(),
        cors_layer(config.cors_origin.as_deref())?,
    );

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "longrun listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    services.join().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
            tracing::info!("shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
