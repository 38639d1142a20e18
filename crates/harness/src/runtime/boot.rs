//! Boot — logging init, config load, Docker connection, listener start.

use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::HarnessConfig;
use crate::docker::client::DockerClient;
use listener::config::ServerConfig;
use listener::{ListenerHandle, MockListener};

/// Initialise the tracing / logging subsystem.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harness=info,listener=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Everything a run needs, ready to use.
pub struct Booted {
    pub config: HarnessConfig,
    pub docker: DockerClient,
    pub listener: ListenerHandle,
}

/// Load and validate config, connect to Docker and start the mock listener
/// the plugin will ship to.
pub async fn boot(config_path: Option<&Path>) -> Result<Booted, Box<dyn std::error::Error>> {
    info!("Starting logzio driver harness v{}", env!("CARGO_PKG_VERSION"));

    let config = HarnessConfig::load(config_path)?;
    config.validate()?;
    info!(
        plugin = %config.plugin.name,
        drain_timeout = %config.plugin.drain_timeout,
        "Loaded configuration"
    );

    info!(
        "Connecting to Docker daemon at: {}",
        if config.docker.socket.is_empty() {
            "default socket"
        } else {
            &config.docker.socket
        }
    );
    let docker = DockerClient::new(&config.docker.socket, config.docker.restart_command.clone())
        .map_err(|e| {
            error!("Failed to connect to Docker: {}", e);
            e
        })?;
    docker.ping().await?;
    info!("Successfully connected to Docker daemon");

    let listener = MockListener::start(&ServerConfig {
        bind_address: config.listener.bind_address.clone(),
        advertise_host: config.listener.advertise_host.clone(),
        ..ServerConfig::default()
    })
    .await?;
    info!(address = %listener.local_addr(), url = %listener.url(), "Mock listener started");

    Ok(Booted {
        config,
        docker,
        listener,
    })
}
