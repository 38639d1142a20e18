//! Host-wide logging defaults in the daemon configuration file.
//!
//! Installing the defaults replaces the file (keeping a backup of any
//! previous one); removing them restores the backup. Neither takes effect
//! until the daemon is restarted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::client::DockerError;

/// `{"log-driver": ..., "log-opts": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonDefaults {
    #[serde(rename = "log-driver")]
    pub log_driver: String,
    #[serde(rename = "log-opts", default)]
    pub log_opts: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DaemonConfigFile {
    path: PathBuf,
}

impl DaemonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".harness-backup");
        PathBuf::from(name)
    }

    /// Write `defaults` as pretty JSON. An existing file is moved aside first.
    pub async fn install(&self, defaults: &DaemonDefaults) -> Result<(), DockerError> {
        let backup = self.backup_path();
        if tokio::fs::try_exists(&self.path).await? && !tokio::fs::try_exists(&backup).await? {
            tokio::fs::rename(&self.path, &backup).await?;
            tracing::info!(path = %self.path.display(), "Backed up existing daemon config");
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_string_pretty(defaults)
            .map_err(|e| DockerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        tokio::fs::write(&self.path, body).await?;
        tracing::info!(path = %self.path.display(), driver = %defaults.log_driver, "Installed daemon logging defaults");
        Ok(())
    }

    /// Remove the installed defaults, putting back whatever was there before.
    /// Removing when nothing is installed is not an error.
    pub async fn remove(&self) -> Result<(), DockerError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let backup = self.backup_path();
        if tokio::fs::try_exists(&backup).await? {
            tokio::fs::rename(&backup, &self.path).await?;
            tracing::info!(path = %self.path.display(), "Restored previous daemon config");
        }
        Ok(())
    }

    /// Defaults currently on disk, if the file exists and parses.
    pub async fn read(&self) -> Result<Option<DaemonDefaults>, DockerError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
