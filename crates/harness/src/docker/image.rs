//! Image domain — build the generator image, remove it afterwards.

use super::client::{map_not_found, DockerClient, DockerError};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `docker build -t <tag> --build-arg k=v ... -f <dockerfile> <context>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuild {
    pub tag: String,
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub build_args: BTreeMap<String, String>,
}

impl ImageBuild {
    pub(crate) fn cli_args(&self) -> Vec<String> {
        let mut args = vec!["build".to_string(), "-q".to_string(), "-t".to_string(), self.tag.clone()];
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push("-f".to_string());
        args.push(self.dockerfile.display().to_string());
        args.push(self.context.display().to_string());
        args
    }
}

impl DockerClient {
    /// Build through the CLI: the Engine API wants a tarred context, the CLI
    /// packs it for us and honours `.dockerignore`.
    pub async fn build_image(&self, build: &ImageBuild) -> Result<(), DockerError> {
        let image_id = self.run_cli(&build.cli_args()).await?;
        tracing::debug!(tag = %build.tag, image_id = %image_id, "Image built");
        Ok(())
    }

    /// Remove an image by ID or tag.
    pub async fn remove_image(&self, image: &str, force: bool) -> Result<(), DockerError> {
        use bollard::query_parameters::RemoveImageOptions;

        let options = Some(RemoveImageOptions {
            force,
            noprune: false,
            ..Default::default()
        });

        self.client
            .remove_image(image, options, None)
            .await
            .map_err(|e| map_not_found(e, || DockerError::ImageNotFound(image.to_string())))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args() {
        let build = ImageBuild {
            tag: "test_one_container:latest".to_string(),
            dockerfile: PathBuf::from("docker/loggen.Dockerfile"),
            context: PathBuf::from("."),
            build_args: BTreeMap::from([
                ("iterations".to_string(), "100".to_string()),
                ("prefix".to_string(), "test".to_string()),
                ("time".to_string(), "0".to_string()),
            ]),
        };

        assert_eq!(
            build.cli_args(),
            vec![
                "build",
                "-q",
                "-t",
                "test_one_container:latest",
                "--build-arg",
                "iterations=100",
                "--build-arg",
                "prefix=test",
                "--build-arg",
                "time=0",
                "-f",
                "docker/loggen.Dockerfile",
                ".",
            ]
        );
    }
}
