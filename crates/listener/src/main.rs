use anyhow::{Context, Result};
use tracing::{info, warn};

use listener::config::{ListenerConfig, LogFormat};
use listener::MockListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: thread-local subscriber so config loading can log
    let _basic_tracing = init_tracing_basic();

    info!("Starting mock logz.io listener v{}", env!("CARGO_PKG_VERSION"));

    let config = ListenerConfig::load().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    // Phase 2: global subscriber from config
    drop(_basic_tracing);
    init_tracing_from_config(&config);

    let handle = MockListener::start(&config.server)
        .await
        .context("Failed to start listener")?;

    info!("Ingestion URL for the driver: {}", handle.url());
    info!("  - Received logs: http://{}/admin/logs", handle.local_addr());
    info!("  - Health check: http://{}/health", handle.local_addr());

    shutdown_signal().await;

    let state = handle.state().clone();
    handle.shutdown().await.context("Server error")?;

    info!(
        received = state.received_count(),
        "Listener shut down gracefully"
    );
    Ok(())
}

fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,listener=debug"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .finish();

    tracing::subscriber::set_default(subscriber)
}

fn init_tracing_from_config(config: &ListenerConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            let layer = fmt::layer().json().with_target(true).with_thread_ids(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, shutting down"),
        _ = terminate => warn!("Received SIGTERM, shutting down"),
    }
}
