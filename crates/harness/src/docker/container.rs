//! Container domain — create, start, wait, enumerate, read logs, remove.

use super::client::{map_not_found, DockerClient, DockerError};
use super::inventory::{ContainerRef, ContainerSpec};

use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig, HostConfigLogConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    WaitContainerOptionsBuilder,
};
use bytes::Bytes;
use futures_util::stream::StreamExt;

impl DockerClient {
    /// Create (but do not start) a container. Returns its id.
    pub async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DockerError> {
        let options = CreateContainerOptionsBuilder::default()
            .name(&spec.name)
            .build();

        let host_config = spec.log_config.as_ref().map(|lc| HostConfig {
            log_config: Some(HostConfigLogConfig {
                typ: Some(lc.driver.clone()),
                config: Some(lc.options.clone().into_iter().collect()),
            }),
            ..Default::default()
        });

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            host_config,
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(options), body)
            .await
            .map_err(|e| map_not_found(e, || DockerError::ImageNotFound(spec.image.clone())))?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "Docker warning on create: {}", warning);
        }
        Ok(response.id)
    }

    pub async fn start_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.client
            .start_container(container_id, None)
            .await
            .map_err(|e| map_not_found(e, || DockerError::ContainerNotFound(container_id.to_string())))
    }

    /// Block until the container is no longer running; returns its exit code.
    pub async fn wait_container(&self, container_id: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptionsBuilder::default()
            .condition("not-running")
            .build();

        let mut stream = self.client.wait_container(container_id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error; it is still an exit code to us
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(map_not_found(e, || {
                DockerError::ContainerNotFound(container_id.to_string())
            })),
            None => Err(DockerError::ConnectionFailed(format!(
                "wait stream for {} ended without a status",
                container_id
            ))),
        }
    }

    /// The `limit` most recently created containers, running or not, in the
    /// daemon's order: most recent first (`docker ps -a -n <limit>`).
    pub async fn list_latest_containers(
        &self,
        limit: usize,
    ) -> Result<Vec<ContainerRef>, DockerError> {
        let options = Some(ListContainersOptions {
            all: true,
            limit: Some(i32::try_from(limit).unwrap_or(i32::MAX)),
            ..Default::default()
        });
        let containers = self.client.list_containers(options).await?;
        Ok(containers.into_iter().map(ContainerRef::from).collect())
    }

    /// Everything the container wrote to stdout/stderr, split into lines.
    pub async fn container_logs(&self, container_id: &str) -> Result<Vec<String>, DockerError> {
        let options = LogsOptions {
            follow: false,
            stdout: true,
            stderr: true,
            since: 0,
            until: 0,
            timestamps: false,
            tail: "all".to_string(),
        };

        let mut stream = self.client.logs(container_id, Some(options));
        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            let output = item.map_err(|e| {
                map_not_found(e, || DockerError::ContainerNotFound(container_id.to_string()))
            })?;
            chunks.push(log_output_bytes(output));
        }

        Ok(split_log_lines(&chunks))
    }

    /// Remove a container. If `force` is true, the container will be killed first.
    pub async fn remove_container(&self, container_id: &str, force: bool) -> Result<(), DockerError> {
        let options = Some(RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        });

        self.client
            .remove_container(container_id, options)
            .await
            .map_err(|e| map_not_found(e, || DockerError::ContainerNotFound(container_id.to_string())))
    }
}

fn log_output_bytes(output: LogOutput) -> Bytes {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message,
    }
}

/// Join raw log frames and split them into lines.
///
/// Frames do not necessarily end on a line boundary. `\r\n` endings are
/// normalised and the empty tail after the final newline is dropped.
pub(crate) fn split_log_lines(chunks: &[Bytes]) -> Vec<String> {
    let mut raw = Vec::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in chunks {
        raw.extend_from_slice(chunk);
    }

    let text = String::from_utf8_lossy(&raw);
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_lines_one_frame_per_line() {
        let chunks = vec![Bytes::from("test_0\n"), Bytes::from("test_1\n")];
        assert_eq!(split_log_lines(&chunks), vec!["test_0", "test_1"]);
    }

    #[test]
    fn test_split_log_lines_frames_cross_boundaries() {
        let chunks = vec![Bytes::from("test_0\nte"), Bytes::from("st_1\ntest_2\n")];
        assert_eq!(split_log_lines(&chunks), vec!["test_0", "test_1", "test_2"]);
    }

    #[test]
    fn test_split_log_lines_crlf_and_no_trailing_newline() {
        let chunks = vec![Bytes::from("a_0\r\na_1")];
        assert_eq!(split_log_lines(&chunks), vec!["a_0", "a_1"]);
    }

    #[test]
    fn test_split_log_lines_empty() {
        assert!(split_log_lines(&[]).is_empty());
        assert!(split_log_lines(&[Bytes::new()]).is_empty());
    }

    #[test]
    fn test_split_log_lines_keeps_interior_blank_lines() {
        let chunks = vec![Bytes::from("a\n\nb\n")];
        assert_eq!(split_log_lines(&chunks), vec!["a", "", "b"]);
    }

    #[test]
    fn test_log_output_bytes_any_stream() {
        let out = LogOutput::StdErr {
            message: Bytes::from("err_0\n"),
        };
        assert_eq!(log_output_bytes(out), Bytes::from("err_0\n"));
    }
}
