//! Plugin domain — inspect, enable/disable and configure the managed
//! logging-driver plugin through `docker plugin`.

use super::client::{DockerClient, DockerError};

impl DockerClient {
    /// Whether `plugin` is installed and enabled.
    pub async fn plugin_enabled(&self, plugin: &str) -> Result<bool, DockerError> {
        let args = [
            "plugin".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Enabled}}".to_string(),
            plugin.to_string(),
        ];
        match self.run_cli(&args).await {
            Ok(out) => parse_enabled(&out),
            Err(DockerError::CommandFailed { stderr, .. })
                if stderr.contains("not found") || stderr.contains("No such") =>
            {
                Err(DockerError::PluginNotFound(plugin.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn set_plugin_enabled(&self, plugin: &str, enabled: bool) -> Result<(), DockerError> {
        let verb = if enabled { "enable" } else { "disable" };
        self.run_cli(&["plugin".to_string(), verb.to_string(), plugin.to_string()])
            .await?;
        tracing::info!(plugin = %plugin, "Plugin {}d", verb);
        Ok(())
    }

    /// `docker plugin set <plugin> KEY=VALUE`. The plugin must be disabled.
    pub async fn set_plugin_env(
        &self,
        plugin: &str,
        key: &str,
        value: &str,
    ) -> Result<(), DockerError> {
        self.run_cli(&[
            "plugin".to_string(),
            "set".to_string(),
            plugin.to_string(),
            format!("{}={}", key, value),
        ])
        .await?;
        Ok(())
    }
}

fn parse_enabled(out: &str) -> Result<bool, DockerError> {
    match out.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(DockerError::CommandFailed {
            command: "docker plugin inspect".to_string(),
            status: "0".to_string(),
            stderr: format!("unexpected Enabled value: {:?}", other),
        }),
    }
}
