//! loadcastd — the Loadcast daemon.
//!
//! Single binary that assembles the predictive autoscaling loop:
//! - State store (redb) for training metadata
//! - Prometheus metrics source
//! - Forecasting engine (seasonal model + synthetic fallback)
//! - External scaler gRPC server
//! - Health/readiness HTTP surface
//!
//! # Usage
//!
//! ```text
//! loadcastd serve --grpc-port 6000 --http-port 8001
//! ```
//!
//! Tuning knobs come from `LOADCAST_*` environment variables; see
//! `config.rs`.

mod config;
mod http;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use loadcast_forecast::ForecastEngine;
use loadcast_metrics::{MetricsSource, PromClient};
use loadcast_scaler::ScalerServer;
use loadcast_state::StateStore;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "loadcastd", about = "Loadcast predictive autoscaling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the forecaster and the external scaler.
    Serve {
        /// Override LOADCAST_GRPC_PORT.
        #[arg(long)]
        grpc_port: Option<u16>,

        /// Override LOADCAST_HTTP_PORT.
        #[arg(long)]
        http_port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loadcastd=debug,loadcast=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            grpc_port,
            http_port,
        } => {
            let mut config = Config::from_env()?;
            if let Some(port) = grpc_port {
                config.grpc_port = port;
            }
            if let Some(port) = http_port {
                config.http_port = port;
            }
            serve(config).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("loadcast daemon starting");

    // Ensure the data directory exists.
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join("loadcast.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let source: Arc<dyn MetricsSource> = Arc::new(PromClient::new(
        &config.prometheus_url,
        Duration::from_secs(config.upstream_timeout_secs),
    ));
    info!(url = %config.prometheus_url, "metrics source initialized");

    let engine = Arc::new(ForecastEngine::new(
        source.clone(),
        store.clone(),
        config.forecast_config(),
    ));
    info!(metric = %config.metric_name, "forecasting engine initialized");

    let scaler = ScalerServer::new(engine, config.scaler_config());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // ── External scaler gRPC server ────────────────────────────

    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.grpc_port));
    let mut grpc_shutdown = shutdown_rx.clone();
    info!(%grpc_addr, "external scaler gRPC server starting");
    let grpc = tonic::transport::Server::builder()
        .add_service(scaler.into_service())
        .serve_with_shutdown(grpc_addr, async move {
            let _ = grpc_shutdown.changed().await;
        });

    // ── Health HTTP surface ────────────────────────────────────

    let router = http::build_router(http::HealthState {
        store,
        source,
        metric: config.metric_name.clone(),
    });
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!(%http_addr, "health server starting");
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let mut http_shutdown = shutdown_rx;
    let http = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = http_shutdown.changed().await;
    });

    let (grpc_result, http_result) = tokio::join!(grpc, http);
    grpc_result?;
    http_result?;

    info!("loadcast daemon stopped");
    Ok(())
}
