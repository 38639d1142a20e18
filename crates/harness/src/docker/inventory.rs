use bollard::models::ContainerSummary;
use std::collections::BTreeMap;

/// A container as enumerated by the list API (`docker ps -a -n k`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerRef {
    pub id: String,         // Full container ID 64-char hash
    pub name: String,       // Without leading slash
    pub image: String,
    pub created_at: i64,    // Unix timestamp
}

impl From<ContainerSummary> for ContainerRef {
    fn from(s: ContainerSummary) -> Self {
        Self {
            id: s.id.unwrap_or_default(),
            name: s
                .names
                .as_deref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/'))
                .unwrap_or("unknown")
                .to_string(),
            image: s.image.unwrap_or_default(),
            created_at: s.created.unwrap_or_default(),
        }
    }
}

/// Log-driver selection for one container (`--log-driver` + `--log-opt`s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub driver: String,
    pub options: BTreeMap<String, String>,
}

/// What to create: a named container from an image, optionally with its own
/// log configuration. `log_config: None` leaves the daemon defaults in charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub log_config: Option<LogConfig>,
}
