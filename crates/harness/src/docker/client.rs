//! Docker client — core struct, constructor, error types, CLI helper.
//!
//! Domain methods live in sibling modules (`container`, `image`, `plugin`)
//! which add `impl DockerClient` blocks.

use bollard::Docker;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Container not found: {0}")]
    ContainerNotFound(String),
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("Container {id} exited with code {code}")]
    ContainerExited { id: String, code: i64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bollard error: {0}")]
    BollardError(#[from] bollard::errors::Error),
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    /// `pub(super)` so that domain modules in sibling files can call bollard
    /// APIs directly.
    pub(super) client: Docker,
    /// The Docker socket path this client is connected to.
    pub(super) socket_path: String,
    /// Host command that restarts the Docker daemon.
    pub(super) restart_command: Vec<String>,
}

impl DockerClient {
    pub fn new(socket_path: &str, restart_command: Vec<String>) -> Result<Self, DockerError> {
        let connection = if socket_path.is_empty() {
            Docker::connect_with_defaults()
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        } else {
            let clean_path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, 120, &bollard::API_DEFAULT_VERSION)
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        };

        Ok(DockerClient {
            client: connection,
            socket_path: socket_path.to_string(),
            restart_command,
        })
    }

    /// Round-trip to the daemon so a dead socket fails at boot, not mid-scenario.
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.client
            .ping()
            .await
            .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    /// Build a `tokio::process::Command` for the Docker CLI that targets
    /// the same daemon this client is connected to.
    pub(super) fn docker_cli_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("docker");
        if !self.socket_path.is_empty() {
            let host = if self.socket_path.starts_with("unix://")
                || self.socket_path.starts_with("tcp://")
            {
                self.socket_path.clone()
            } else {
                format!("unix://{}", self.socket_path)
            };
            cmd.env("DOCKER_HOST", host);
        }
        cmd
    }

    /// Run `docker <args>` and return its trimmed stdout.
    pub(super) async fn run_cli(&self, args: &[String]) -> Result<String, DockerError> {
        let label = format!("docker {}", args.join(" "));
        tracing::debug!(command = %label, "Running Docker CLI");

        let output = self
            .docker_cli_command()
            .args(args)
            .output()
            .await
            .map_err(|e| DockerError::ConnectionFailed(format!("Failed to run docker CLI: {}", e)))?;

        check_output(&label, output)
    }

    /// Restart the Docker daemon with the configured host command
    /// (`service docker restart` by default).
    pub async fn restart_daemon(&self) -> Result<(), DockerError> {
        let (program, args) = self.restart_command.split_first().ok_or_else(|| {
            DockerError::CommandFailed {
                command: String::new(),
                status: "not run".to_string(),
                stderr: "daemon restart command is empty".to_string(),
            }
        })?;

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await?;
        check_output(&self.restart_command.join(" "), output)?;

        // The API socket goes away during the restart; wait for it to answer again.
        let mut last_err = None;
        for _ in 0..30 {
            match self.ping().await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        Err(last_err.unwrap_or_else(|| {
            DockerError::ConnectionFailed("daemon did not come back".to_string())
        }))
    }
}

/// Turn a finished process into its stdout, or a `CommandFailed` carrying stderr.
pub(crate) fn check_output(
    label: &str,
    output: std::process::Output,
) -> Result<String, DockerError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DockerError::CommandFailed {
            command: label.to_string(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Map a 404 from the daemon onto `not_found`, everything else onto `BollardError`.
pub(super) fn map_not_found(
    err: bollard::errors::Error,
    not_found: impl FnOnce() -> DockerError,
) -> DockerError {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => not_found(),
        other => DockerError::BollardError(other),
    }
}
