use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Socket the ingestion endpoint binds to. Port 0 picks a free port.
    pub bind_address: String,
    /// Host name the log driver should use to reach this endpoint.
    /// The daemon (and the plugin) run outside the harness process, so the
    /// bind address is not necessarily routable from there.
    pub advertise_host: String,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    /// Status returned for well-formed batches unless overridden at runtime.
    pub default_status: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl ListenerConfig {
    /// Load configuration from listener.toml and environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&ListenerConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        let config_paths = vec![
            "/etc/logzio-harness/listener",
            "config/listener",
            "crates/listener/config/listener",
        ];

        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Double underscore for nested keys: LISTENER__SERVER__BIND_ADDRESS
        builder = builder.add_source(
            config::Environment::with_prefix("LISTENER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        self.bind_address
            .parse::<std::net::SocketAddr>()
            .context("Invalid bind_address")?;

        if self.advertise_host.trim().is_empty() {
            anyhow::bail!("advertise_host must not be empty");
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be > 0");
        }
        axum::http::StatusCode::from_u16(self.default_status)
            .with_context(|| format!("Invalid default_status {}", self.default_status))?;

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:0".to_string(),
            advertise_host: "127.0.0.1".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
            default_status: 200,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig {
                level: "info,listener=debug".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}
