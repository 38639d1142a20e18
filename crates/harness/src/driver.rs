//! Container driver — builds generator images, runs containers under the
//! plugin, observes them and tears everything down again.
//!
//! Every image and container the driver creates is tracked until `cleanup`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::docker::ContainerOps;
use crate::conf::HarnessConfig;
use crate::docker::client::DockerError;
use crate::docker::daemon::{DaemonConfigFile, DaemonDefaults};
use crate::docker::image::ImageBuild;
use crate::docker::inventory::{ContainerRef, ContainerSpec, LogConfig};
use crate::docker::spool::{find_dir, spool_dir_name, SpoolLookup};
use crate::line::ExpectedSequence;

pub const OPT_TOKEN: &str = "logzio-token";
pub const OPT_URL: &str = "logzio-url";
pub const OPT_DIR_PATH: &str = "logzio-dir-path";
pub const DRAIN_TIMEOUT_ENV: &str = "LOGZIO_DRIVER_LOGS_DRAIN_TIMEOUT";

/// Log-driver options for one container (or for the daemon defaults).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub token: String,
    pub url: String,
    pub dir_path: String,
}

impl DriverConfig {
    pub fn options(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (OPT_TOKEN.to_string(), self.token.clone()),
            (OPT_URL.to_string(), self.url.clone()),
            (OPT_DIR_PATH.to_string(), self.dir_path.clone()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Return once the container exited; a non-zero exit is an error.
    Foreground,
    /// Return as soon as the container started.
    Detached,
}

/// Parameters baked into a generator image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlan {
    pub tag: String,
    pub prefix: String,
    pub iterations: u64,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub tag: String,
    pub expected: ExpectedSequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub image: String,
    pub expected: ExpectedSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Exited(i64),
    StillRunning,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub containers_removed: usize,
    pub images_removed: usize,
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
struct Created {
    images: Vec<String>,
    containers: Vec<String>,
    daemon_defaults: bool,
}

pub struct ContainerDriver {
    ops: Arc<dyn ContainerOps>,
    plugin: String,
    drain_timeout: String,
    dockerfile: PathBuf,
    context: PathBuf,
    spool_root: PathBuf,
    daemon_file: DaemonConfigFile,
    created: Mutex<Created>,
}

impl ContainerDriver {
    pub fn new(ops: Arc<dyn ContainerOps>, config: &HarnessConfig) -> Self {
        Self {
            ops,
            plugin: config.plugin.name.clone(),
            drain_timeout: config.plugin.drain_timeout.clone(),
            dockerfile: PathBuf::from(&config.image.dockerfile),
            context: PathBuf::from(&config.image.context),
            spool_root: PathBuf::from(&config.docker.plugin_state_root),
            daemon_file: DaemonConfigFile::new(&config.docker.daemon_config_path),
            created: Mutex::new(Created::default()),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    // ── Plugin & daemon setup ───────────────────────────────────

    /// Configure the plugin's drain timeout and make sure it is enabled.
    /// `plugin set` only works on a disabled plugin.
    pub async fn prepare_plugin(&self) -> Result<(), DockerError> {
        if self.ops.plugin_enabled(&self.plugin).await? {
            self.ops.set_plugin_enabled(&self.plugin, false).await?;
        }
        self.ops
            .set_plugin_env(&self.plugin, DRAIN_TIMEOUT_ENV, &self.drain_timeout)
            .await?;
        self.ops.set_plugin_enabled(&self.plugin, true).await?;
        info!(
            plugin = %self.plugin,
            drain_timeout = %self.drain_timeout,
            "Plugin prepared"
        );
        Ok(())
    }

    /// Make the plugin the host-wide default driver with `config`, then
    /// restart the daemon so it takes effect.
    pub async fn install_daemon_defaults(&self, config: &DriverConfig) -> Result<(), DockerError> {
        let defaults = DaemonDefaults {
            log_driver: self.plugin.clone(),
            log_opts: config.options(),
        };
        self.created.lock().await.daemon_defaults = true;
        self.daemon_file.install(&defaults).await?;
        self.ops.restart_daemon().await?;
        Ok(())
    }

    pub async fn restore_daemon_defaults(&self) -> Result<(), DockerError> {
        self.daemon_file.remove().await?;
        self.ops.restart_daemon().await?;
        self.created.lock().await.daemon_defaults = false;
        Ok(())
    }

    // ── Build & run ─────────────────────────────────────────────

    pub async fn build(&self, plan: &ImagePlan) -> Result<ImageRef, DockerError> {
        let build = ImageBuild {
            tag: plan.tag.clone(),
            dockerfile: self.dockerfile.clone(),
            context: self.context.clone(),
            build_args: BTreeMap::from([
                ("iterations".to_string(), plan.iterations.to_string()),
                ("prefix".to_string(), plan.prefix.clone()),
                ("time".to_string(), plan.delay_secs.to_string()),
            ]),
        };

        self.ops.build_image(&build).await?;
        self.created.lock().await.images.push(plan.tag.clone());
        info!(tag = %plan.tag, iterations = plan.iterations, "Built image");

        Ok(ImageRef {
            tag: plan.tag.clone(),
            expected: ExpectedSequence::new(plan.prefix.clone(), plan.iterations),
        })
    }

    /// Start a container from `image`. With `config: None` no log driver is
    /// set on the container and the daemon defaults apply.
    pub async fn run(
        &self,
        image: &ImageRef,
        config: Option<&DriverConfig>,
        mode: RunMode,
    ) -> Result<ContainerHandle, DockerError> {
        let name = format!(
            "{}-{}",
            image.expected.prefix(),
            chrono::Utc::now().timestamp_millis()
        );
        let spec = ContainerSpec {
            name: name.clone(),
            image: image.tag.clone(),
            log_config: config.map(|c| LogConfig {
                driver: self.plugin.clone(),
                options: c.options(),
            }),
        };

        let id = self.ops.create_container(&spec).await?;
        self.created.lock().await.containers.push(id.clone());
        self.ops.start_container(&id).await?;
        debug!(container = %name, id = %id, ?mode, "Container started");

        if mode == RunMode::Foreground {
            let code = self.ops.wait_container(&id).await?;
            if code != 0 {
                return Err(DockerError::ContainerExited { id, code });
            }
        }

        Ok(ContainerHandle {
            id,
            name,
            image: image.tag.clone(),
            expected: image.expected.clone(),
        })
    }

    /// Wait (bounded) for the container's process to exit.
    pub async fn await_stable(
        &self,
        handle: &ContainerHandle,
        timeout: Duration,
    ) -> Result<Stability, DockerError> {
        match tokio::time::timeout(timeout, self.ops.wait_container(&handle.id)).await {
            Ok(code) => Ok(Stability::Exited(code?)),
            Err(_) => {
                warn!(container = %handle.name, ?timeout, "Container still running");
                Ok(Stability::StillRunning)
            }
        }
    }

    /// Force-remove a running container. Its spool directory belongs to the
    /// plugin and survives.
    pub async fn kill(&self, handle: &ContainerHandle) -> Result<(), DockerError> {
        self.ops.remove_container(&handle.id, true).await?;
        self.created.lock().await.containers.retain(|c| c != &handle.id);
        info!(container = %handle.name, "Container killed");
        Ok(())
    }

    // ── Observation ─────────────────────────────────────────────

    pub async fn read_driver_logs(&self, handle: &ContainerHandle) -> Result<Vec<String>, DockerError> {
        self.read_logs(&handle.id).await
    }

    pub async fn read_logs(&self, container_id: &str) -> Result<Vec<String>, DockerError> {
        self.ops.container_logs(container_id).await
    }

    /// The `k` most recently created containers in the order they were
    /// started. The daemon lists newest first; this reverses it.
    pub async fn latest_containers(&self, k: usize) -> Result<Vec<ContainerRef>, DockerError> {
        let mut containers = self.ops.list_latest_containers(k).await?;
        containers.reverse();
        Ok(containers)
    }

    /// Look for the plugin's queue directory named after `logzio-dir-path`.
    pub async fn locate_spool(&self, dir_path: &str) -> Result<SpoolLookup, DockerError> {
        let root = self.spool_root.clone();
        let name = spool_dir_name(dir_path).to_string();
        let lookup = tokio::task::spawn_blocking(move || find_dir(&root, &name))
            .await
            .map_err(|e| DockerError::Io(std::io::Error::other(e)))??;
        debug!(dir = %dir_path, found = lookup.is_found(), "Spool lookup");
        Ok(lookup)
    }

    // ── Teardown ────────────────────────────────────────────────

    /// Remove every container and image created since the last cleanup and
    /// restore daemon defaults if they were installed. Keeps going past
    /// individual failures.
    pub async fn cleanup(&self) -> CleanupReport {
        let created = std::mem::take(&mut *self.created.lock().await);
        let mut report = CleanupReport::default();

        if created.daemon_defaults {
            if let Err(e) = self.restore_daemon_defaults().await {
                report.failures.push(format!("restore daemon config: {}", e));
            }
        }

        for id in &created.containers {
            match self.ops.remove_container(id, true).await {
                Ok(()) | Err(DockerError::ContainerNotFound(_)) => report.containers_removed += 1,
                Err(e) => report.failures.push(format!("remove container {}: {}", id, e)),
            }
        }

        for tag in &created.images {
            match self.ops.remove_image(tag).await {
                Ok(()) | Err(DockerError::ImageNotFound(_)) => report.images_removed += 1,
                Err(e) => report.failures.push(format!("remove image {}: {}", tag, e)),
            }
        }

        for failure in &report.failures {
            warn!("Cleanup failure: {}", failure);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeEngine;
    use listener::ListenerState;

    struct Fixture {
        engine: Arc<FakeEngine>,
        driver: ContainerDriver,
        sink: ListenerState,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.docker.plugin_state_root = dir.path().join("plugins").display().to_string();
        config.docker.daemon_config_path = dir.path().join("daemon.json").display().to_string();

        let sink = ListenerState::default();
        let engine = Arc::new(
            FakeEngine::new(sink.clone())
                .with_plugin(&config.plugin.name)
                .with_spool_root(dir.path().join("plugins"))
                .with_daemon_config(dir.path().join("daemon.json")),
        );
        let driver = ContainerDriver::new(engine.clone(), &config);
        Fixture {
            engine,
            driver,
            sink,
            _dir: dir,
        }
    }

    fn plan(prefix: &str, iterations: u64) -> ImagePlan {
        ImagePlan {
            tag: format!("{}:latest", prefix),
            prefix: prefix.to_string(),
            iterations,
            delay_secs: 0,
        }
    }

    fn driver_config(dir: &str) -> DriverConfig {
        DriverConfig {
            token: "token".to_string(),
            url: "http://127.0.0.1:1".to_string(),
            dir_path: dir.to_string(),
        }
    }

    #[tokio::test]
    async fn test_prepare_plugin_sets_drain_timeout_and_enables() {
        let f = fixture();
        f.engine.set_plugin_state("logzio/logzio-logging-plugin:latest", true).await;

        f.driver.prepare_plugin().await.unwrap();

        let plugin = f.engine.plugin("logzio/logzio-logging-plugin:latest").await.unwrap();
        assert!(plugin.enabled);
        assert_eq!(plugin.env.get(DRAIN_TIMEOUT_ENV).map(String::as_str), Some("1s"));
    }

    #[tokio::test]
    async fn test_foreground_run_reads_ordered_logs() {
        let f = fixture();
        let image = f.driver.build(&plan("test", 100)).await.unwrap();
        let handle = f
            .driver
            .run(&image, Some(&driver_config("./test_one")), RunMode::Foreground)
            .await
            .unwrap();

        let logs = f.driver.read_driver_logs(&handle).await.unwrap();
        assert_eq!(logs, image.expected.lines().collect::<Vec<_>>());
        assert!(f.sink.has_received("test_99"));
        assert!(f.driver.locate_spool("./test_one").await.unwrap().is_found());
    }

    #[tokio::test]
    async fn test_build_failure_is_reported() {
        let f = fixture();
        f.engine.fail_build("broken:latest").await;
        assert!(matches!(
            f.driver.build(&plan("broken", 1)).await,
            Err(DockerError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_latest_containers_in_start_order() {
        let f = fixture();
        let mut started = Vec::new();
        for i in 0..3 {
            let image = f.driver.build(&plan(&format!("multi{}", i), 1)).await.unwrap();
            let h = f
                .driver
                .run(&image, Some(&driver_config("./multi")), RunMode::Detached)
                .await
                .unwrap();
            started.push(h.id);
        }

        let ids: Vec<String> = f
            .driver
            .latest_containers(3)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, started);
    }

    #[tokio::test]
    async fn test_kill_then_logs_unavailable_spool_kept() {
        let f = fixture();
        f.engine.set_emit_limit(Some(5)).await;
        let image = f.driver.build(&plan("kill", 10_000)).await.unwrap();
        let handle = f
            .driver
            .run(&image, Some(&driver_config("./kill_dir")), RunMode::Detached)
            .await
            .unwrap();

        f.driver.kill(&handle).await.unwrap();

        assert!(matches!(
            f.driver.read_driver_logs(&handle).await,
            Err(DockerError::ContainerNotFound(_))
        ));
        assert!(f.driver.locate_spool("./kill_dir").await.unwrap().is_found());
        assert_eq!(f.sink.received_count(), 5);
    }

    #[tokio::test]
    async fn test_await_stable_times_out_on_running_container() {
        let f = fixture();
        f.engine.set_emit_limit(Some(1)).await;
        f.engine.set_hold_running(true).await;
        let image = f.driver.build(&plan("slow", 10)).await.unwrap();
        let handle = f.driver.run(&image, None, RunMode::Detached).await.unwrap();

        let stability = f
            .driver
            .await_stable(&handle, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(stability, Stability::StillRunning);
    }

    #[tokio::test]
    async fn test_cleanup_removes_everything_and_collects_failures() {
        let f = fixture();
        let image = f.driver.build(&plan("clean", 1)).await.unwrap();
        f.driver.run(&image, None, RunMode::Foreground).await.unwrap();
        f.engine.fail_remove_image(true).await;

        let report = f.driver.cleanup().await;
        assert_eq!(report.containers_removed, 1);
        assert_eq!(report.images_removed, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(f.engine.live_containers().await, 0);

        // Nothing left to clean on the second pass
        let report = f.driver.cleanup().await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_daemon_defaults_route_unconfigured_container() {
        let f = fixture();
        f.driver
            .install_daemon_defaults(&driver_config("./daemon_dir"))
            .await
            .unwrap();
        assert_eq!(f.engine.restarts().await, 1);

        let image = f.driver.build(&plan("daemon", 10)).await.unwrap();
        f.driver.run(&image, None, RunMode::Foreground).await.unwrap();
        assert!(f.sink.has_received("daemon_9"));
        assert_eq!(f.sink.messages_for_token("token").len(), 10);

        // Cleanup restores the daemon config and restarts again
        let report = f.driver.cleanup().await;
        assert!(report.is_clean());
        assert_eq!(f.engine.restarts().await, 2);
    }

    #[tokio::test]
    async fn test_foreground_non_zero_exit() {
        let f = fixture();
        f.engine.set_exit_code(3).await;
        let image = f.driver.build(&plan("bad", 1)).await.unwrap();
        assert!(matches!(
            f.driver.run(&image, None, RunMode::Foreground).await,
            Err(DockerError::ContainerExited { code: 3, .. })
        ));
        // The container was created, so cleanup still has it
        assert_eq!(f.driver.cleanup().await.containers_removed, 1);
    }
}
