//! Model — HarnessConfig and related structs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub plugin: PluginConfig,
    pub docker: DockerConfig,
    pub listener: ListenerSection,
    pub image: ImageConfig,
    pub settle: SettleConfig,
    pub scenarios: ScenarioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Plugin reference used as `--log-driver`.
    pub name: String,
    /// Value for `LOGZIO_DRIVER_LOGS_DRAIN_TIMEOUT`; short so killed
    /// containers still flush within a scenario.
    pub drain_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Empty means bollard's defaults (`DOCKER_HOST` or the local socket).
    pub socket: String,
    pub daemon_config_path: String,
    pub restart_command: Vec<String>,
    /// Root searched for the plugin's queue directories.
    pub plugin_state_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerSection {
    pub bind_address: String,
    /// Host the plugin (running inside the daemon) uses to reach the listener.
    pub advertise_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub dockerfile: String,
    pub context: String,
}

/// Poll-with-backoff parameters used instead of fixed sleeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Upper bound for the listener to catch up once containers are stable.
    pub timeout_secs: u64,
    /// Upper bound for a container to exit on its own.
    pub container_exit_timeout_secs: u64,
    /// A killed container's deliveries are considered complete once the
    /// listener count has not moved for this long.
    pub quiet_period_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub token: String,
    pub containers: usize,
    /// How long the kill scenario lets its container write before killing it.
    pub kill_after_ms: u64,
    /// Consecutive scenarios whose cleanup failed before the run halts.
    pub max_cleanup_failures: u32,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: "logzio/logzio-logging-plugin:latest".to_string(),
            drain_timeout: "1s".to_string(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "".to_string(),
            daemon_config_path: "/etc/docker/daemon.json".to_string(),
            restart_command: vec![
                "service".to_string(),
                "docker".to_string(),
                "restart".to_string(),
            ],
            plugin_state_root: "/var/lib/docker/plugins".to_string(),
        }
    }
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:0".to_string(),
            advertise_host: "127.0.0.1".to_string(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            dockerfile: "docker/loggen.Dockerfile".to_string(),
            context: ".".to_string(),
        }
    }
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 250,
            max_interval_ms: 5_000,
            timeout_secs: 60,
            container_exit_timeout_secs: 120,
            quiet_period_ms: 3_000,
        }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            token: "token".to_string(),
            containers: 5,
            kill_after_ms: 500,
            max_cleanup_failures: 2,
        }
    }
}
