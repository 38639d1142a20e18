//! Load — config loading from file and environment variables.

use std::path::Path;

use super::model::HarnessConfig;

const DEFAULT_CONFIG_FILE: &str = "/etc/logzio-harness/harness.toml";

impl HarnessConfig {
    /// Load configuration from file or environment variables.
    /// Priority: Environment Variables > Config File > Defaults
    ///
    /// `path` (from `--config`) wins over `HARNESS_CONFIG_FILE`; an explicit
    /// path that does not exist is an error, the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match path {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::from_file(path)?
            }
            None => {
                let config_path = std::env::var("HARNESS_CONFIG_FILE")
                    .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
                if Path::new(&config_path).exists() {
                    tracing::info!("Loading configuration from: {}", config_path);
                    Self::from_file(Path::new(&config_path))?
                } else {
                    tracing::info!(
                        "Config file not found at {}, using environment variables",
                        config_path
                    );
                    Self::from_env()
                }
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: HarnessConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Defaults plus whatever the environment sets.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("HARNESS_SETTLE_TIMEOUT_SECS") {
            config.settle.timeout_secs = v;
        }
        if let Some(v) = env_parse("HARNESS_CONTAINERS") {
            config.scenarios.containers = v;
        }
        if let Ok(token) = std::env::var("HARNESS_TOKEN") {
            config.scenarios.token = token;
        }
        config
    }

    /// Environment variables override file config for host-specific settings
    fn apply_env_overrides(&mut self) {
        if let Ok(socket) = std::env::var("DOCKER_SOCKET") {
            self.docker.socket = socket;
        }
        if let Ok(plugin) = std::env::var("HARNESS_PLUGIN") {
            self.plugin.name = plugin;
        }
        if let Ok(host) = std::env::var("HARNESS_LISTENER_HOST") {
            self.listener.advertise_host = host;
        }
    }

    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), String> {
        if self.plugin.name.trim().is_empty() {
            return Err("plugin.name must not be empty".to_string());
        }
        if self.docker.restart_command.is_empty() {
            return Err("docker.restart_command must not be empty".to_string());
        }
        if self.docker.daemon_config_path.is_empty() {
            return Err("docker.daemon_config_path must not be empty".to_string());
        }
        if self.listener.advertise_host.trim().is_empty() {
            return Err("listener.advertise_host must not be empty".to_string());
        }
        if self
            .listener
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!(
                "listener.bind_address is not a socket address: {}",
                self.listener.bind_address
            ));
        }
        if self.scenarios.token.is_empty() {
            return Err("scenarios.token must not be empty".to_string());
        }
        if self.scenarios.containers == 0 {
            return Err("scenarios.containers must be > 0".to_string());
        }
        if self.scenarios.max_cleanup_failures == 0 {
            return Err("scenarios.max_cleanup_failures must be > 0".to_string());
        }
        if self.settle.initial_interval_ms == 0 {
            return Err("settle.initial_interval_ms must be > 0".to_string());
        }
        if self.settle.max_interval_ms < self.settle.initial_interval_ms {
            return Err("settle.max_interval_ms must be >= settle.initial_interval_ms".to_string());
        }
        if !Path::new(&self.image.dockerfile).exists() {
            return Err(format!("Dockerfile not found at: {}", self.image.dockerfile));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> (HarnessConfig, tempfile::NamedTempFile) {
        let dockerfile = tempfile::NamedTempFile::new().unwrap();
        let mut config = HarnessConfig::default();
        config.image.dockerfile = dockerfile.path().display().to_string();
        (config, dockerfile)
    }

    #[test]
    fn test_validate_defaults_with_dockerfile() {
        let (config, _f) = valid_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_dockerfile() {
        let mut config = HarnessConfig::default();
        config.image.dockerfile = "/nonexistent/loggen.Dockerfile".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Dockerfile"));
    }

    #[test]
    fn test_validate_zero_containers() {
        let (mut config, _f) = valid_config();
        config.scenarios.containers = 0;
        assert!(config.validate().unwrap_err().contains("containers"));
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let (mut config, _f) = valid_config();
        config.settle.max_interval_ms = 10;
        config.settle.initial_interval_ms = 100;
        assert!(config.validate().unwrap_err().contains("max_interval_ms"));
    }

    #[test]
    fn test_validate_bind_address() {
        let (mut config, _f) = valid_config();
        config.listener.bind_address = "localhost".to_string();
        assert!(config.validate().unwrap_err().contains("bind_address"));
    }

    #[test]
    fn test_validate_empty_restart_command() {
        let (mut config, _f) = valid_config();
        config.docker.restart_command.clear();
        assert!(config.validate().unwrap_err().contains("restart_command"));
    }

    #[test]
    fn test_from_file_partial_sections_keep_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[plugin]
name = "example/plugin:dev"

[settle]
timeout_secs = 5
"#
        )
        .unwrap();

        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.plugin.name, "example/plugin:dev");
        assert_eq!(config.plugin.drain_timeout, "1s");
        assert_eq!(config.settle.timeout_secs, 5);
        assert_eq!(config.settle.initial_interval_ms, 250);
        assert_eq!(config.scenarios.containers, 5);
        assert_eq!(config.docker.restart_command, vec!["service", "docker", "restart"]);
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[plugin\nname = ").unwrap();
        assert!(HarnessConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_load_explicit_missing_path_is_error() {
        assert!(HarnessConfig::load(Some(Path::new("/nonexistent/harness.toml"))).is_err());
    }
}
