//! Snow bridge service binary.
//!
//! Receives Alertmanager webhooks and opens one ServiceNow incident per alert.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snow_bridge::{
    build_router, AlertProcessor, AppState, Config, PrometheusObserver, Readiness,
    ServiceNowClient,
};

/// Alertmanager webhook receiver that opens ServiceNow incidents
#[derive(Parser)]
#[command(name = "snow-bridge")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults to ./config.toml if present)
    #[arg(long, env = "SNOW_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config);

    info!(id = %config.id, port = config.port, "Starting snow bridge...");

    let publisher = ServiceNowClient::new(
        &config.snow_url,
        config.snow_username.clone(),
        config.snow_password.clone(),
        config.request_timeout(),
    )
    .context("Failed to create ServiceNow client")?;
    info!(endpoint = %publisher.endpoint(), "ServiceNow client configured");

    let observer = PrometheusObserver::new().context("Failed to register metrics")?;
    let readiness = Readiness::default();
    let grace = config.shutdown_grace();
    let port = config.port;

    let state = AppState {
        metrics: config.metrics.then(|| observer.clone()),
        observer: Arc::new(observer),
        processor: AlertProcessor::new(Arc::new(publisher)),
        config: Arc::new(config),
        readiness: readiness.clone(),
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    readiness.mark_ready();
    info!(port, "Snow bridge listening");

    shutdown_signal().await;
    readiness.mark_not_ready();
    let _ = stop_tx.send(());

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined
            .context("Server task failed")?
            .context("Server error")?,
        Err(_) => warn!(
            grace_secs = grace.as_secs(),
            "In-flight requests did not finish within the grace period"
        ),
    }

    info!("Shutting down snow bridge");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(config: &Config) {
    let level = config.log_level();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(level.map_or_else(|| "info".to_string(), |l| l.to_string().to_lowercase()))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if level.is_none() {
        warn!(
            log_level = %config.log_level,
            "Unrecognised log level, defaulting to INFO"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
