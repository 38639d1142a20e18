//! Fake — test double for Docker operations.
//!
//! Provides a deterministic [`FakeEngine`] that implements [`ContainerOps`]
//! using in-memory state. Containers "run" the line generator from their
//! image's build args, and a simulated plugin forwards the lines straight
//! into a [`ListenerState`], so whole scenarios can run without a daemon.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use listener::{ListenerState, ReceivedRecord};
use tokio::sync::Mutex;

use crate::client::docker::{ContainerOps, OpsFuture};
use crate::docker::client::DockerError;
use crate::docker::daemon::DaemonConfigFile;
use crate::docker::image::ImageBuild;
use crate::docker::inventory::{ContainerRef, ContainerSpec, LogConfig};
use crate::docker::spool::spool_dir_name;
use crate::line::ExpectedSequence;

// ── In-memory state ─────────────────────────────────────────────

/// How the simulated plugin treats the lines it ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Every line exactly once.
    #[default]
    All,
    /// Nothing reaches the listener.
    Nothing,
    /// The last `n` lines of every container are lost.
    DropLast(usize),
    /// The first line of every container is shipped twice.
    DuplicateFirst,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FakeState {
    Running,
    Exited(i64),
}

#[derive(Clone, Debug)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Effective log config: the container's own or the daemon default.
    pub log_config: Option<LogConfig>,
    pub state: FakeState,
    pub logs: Vec<String>,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default)]
pub struct FakePlugin {
    pub enabled: bool,
    pub env: HashMap<String, String>,
}

/// Mutable inner state protected by a mutex.
#[derive(Default)]
struct Inner {
    images: HashMap<String, BTreeMap<String, String>>,
    /// Creation order; removed containers are dropped.
    containers: Vec<FakeContainer>,
    plugins: HashMap<String, FakePlugin>,
    daemon_defaults: Option<LogConfig>,
    next_id: u64,
    restarts: u32,
    delivery: Delivery,
    /// Lines a container writes on start before it has to be waited on.
    emit_limit: Option<usize>,
    /// Leave containers running forever once `emit_limit` is reached.
    hold_running: bool,
    exit_code: i64,
    swap_driver_lines: bool,
    failing_builds: HashSet<String>,
    fail_remove_image: bool,
}

/// A fake Docker engine for deterministic testing.
pub struct FakeEngine {
    inner: Mutex<Inner>,
    sink: ListenerState,
    spool_root: Option<PathBuf>,
    daemon_file: Option<DaemonConfigFile>,
}

impl FakeEngine {
    /// Create an empty engine whose plugin ships into `sink`.
    pub fn new(sink: ListenerState) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            sink,
            spool_root: None,
            daemon_file: None,
        }
    }

    /// Install `name` as an enabled plugin.
    pub fn with_plugin(mut self, name: &str) -> Self {
        self.inner.get_mut().plugins.insert(
            name.to_string(),
            FakePlugin {
                enabled: true,
                env: HashMap::new(),
            },
        );
        self
    }

    /// Where the simulated plugin creates its queue directories.
    pub fn with_spool_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.spool_root = Some(root.into());
        self
    }

    /// Daemon config file read back on every `restart_daemon`.
    pub fn with_daemon_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.daemon_file = Some(DaemonConfigFile::new(path));
        self
    }

    // ── Knobs ───────────────────────────────────────────────────

    pub async fn set_delivery(&self, delivery: Delivery) {
        self.inner.lock().await.delivery = delivery;
    }

    pub async fn set_emit_limit(&self, limit: Option<usize>) {
        self.inner.lock().await.emit_limit = limit;
    }

    pub async fn set_hold_running(&self, hold: bool) {
        self.inner.lock().await.hold_running = hold;
    }

    pub async fn set_exit_code(&self, code: i64) {
        self.inner.lock().await.exit_code = code;
    }

    /// Report the first two lines of every driver log in the wrong order.
    pub async fn swap_driver_lines(&self, swap: bool) {
        self.inner.lock().await.swap_driver_lines = swap;
    }

    pub async fn fail_build(&self, tag: &str) {
        self.inner.lock().await.failing_builds.insert(tag.to_string());
    }

    pub async fn fail_remove_image(&self, fail: bool) {
        self.inner.lock().await.fail_remove_image = fail;
    }

    pub async fn set_plugin_state(&self, name: &str, enabled: bool) {
        self.inner
            .lock()
            .await
            .plugins
            .entry(name.to_string())
            .or_default()
            .enabled = enabled;
    }

    // ── Inspection ──────────────────────────────────────────────

    pub async fn plugin(&self, name: &str) -> Option<FakePlugin> {
        self.inner.lock().await.plugins.get(name).cloned()
    }

    pub async fn live_containers(&self) -> usize {
        self.inner.lock().await.containers.len()
    }

    pub async fn images(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.inner.lock().await.images.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub async fn restarts(&self) -> u32 {
        self.inner.lock().await.restarts
    }

    // ── Simulation ──────────────────────────────────────────────

    /// Append `lines` to the container's log and let the plugin ship them.
    /// `total` is the length of the container's whole sequence.
    fn emit(&self, inner: &mut Inner, idx: usize, lines: Vec<String>, total: usize) {
        let delivery = inner.delivery;
        let container = &mut inner.containers[idx];
        container.logs.extend(lines.iter().cloned());

        let Some(log_config) = &container.log_config else {
            return;
        };
        let plugin_enabled = inner
            .plugins
            .get(&log_config.driver)
            .is_some_and(|p| p.enabled);
        if !plugin_enabled {
            return;
        }
        let token = log_config.options.get("logzio-token").cloned().unwrap_or_default();

        // Index of the first line in this batch within the whole sequence
        let offset = container.logs.len() - lines.len();
        let mut shipped = lines;
        match delivery {
            Delivery::All => {}
            Delivery::Nothing => shipped.clear(),
            Delivery::DropLast(n) => {
                let keep = total.saturating_sub(n).saturating_sub(offset);
                shipped.truncate(keep);
            }
            Delivery::DuplicateFirst => {
                if offset == 0 {
                    if let Some(first) = shipped.first().cloned() {
                        shipped.insert(0, first);
                    }
                }
            }
        }

        let now = Utc::now();
        self.sink.ingest(
            shipped
                .into_iter()
                .map(|message| ReceivedRecord {
                    token: token.clone(),
                    message,
                    hostname: Some(container.name.clone()),
                    log_type: None,
                    received_at: now,
                })
                .collect(),
        );
    }

    fn create_spool(&self, log_config: &LogConfig) -> Result<(), DockerError> {
        let (Some(root), Some(dir)) = (&self.spool_root, log_config.options.get("logzio-dir-path"))
        else {
            return Ok(());
        };
        std::fs::create_dir_all(root.join("fakeplugin/rootfs/var/spool").join(spool_dir_name(dir)))?;
        Ok(())
    }

    fn position(inner: &Inner, id: &str) -> Result<usize, DockerError> {
        inner
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| DockerError::ContainerNotFound(id.to_string()))
    }

    fn sequence_for(inner: &Inner, image: &str) -> ExpectedSequence {
        let args = inner.images.get(image);
        let get = |k: &str| args.and_then(|a| a.get(k)).cloned();
        ExpectedSequence::new(
            get("prefix").unwrap_or_else(|| "pre".to_string()),
            get("iterations").and_then(|s| s.parse().ok()).unwrap_or(1000),
        )
    }
}

// ── ContainerOps implementation ─────────────────────────────────

impl ContainerOps for FakeEngine {
    fn build_image<'a>(&'a self, build: &'a ImageBuild) -> OpsFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            if inner.failing_builds.contains(&build.tag) {
                return Err(DockerError::CommandFailed {
                    command: format!("docker build -t {}", build.tag),
                    status: "exit status: 1".to_string(),
                    stderr: "build failed".to_string(),
                });
            }
            inner.images.insert(build.tag.clone(), build.build_args.clone());
            Ok(())
        })
    }

    fn remove_image<'a>(&'a self, image: &'a str) -> OpsFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            if inner.fail_remove_image {
                return Err(DockerError::CommandFailed {
                    command: format!("docker rmi {}", image),
                    status: "exit status: 1".to_string(),
                    stderr: "image is in use".to_string(),
                });
            }
            inner
                .images
                .remove(image)
                .map(|_| ())
                .ok_or_else(|| DockerError::ImageNotFound(image.to_string()))
        })
    }

    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> OpsFuture<'a, String> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            if !inner.images.contains_key(&spec.image) {
                return Err(DockerError::ImageNotFound(spec.image.clone()));
            }
            inner.next_id += 1;
            let id = format!("fake{:060}", inner.next_id);
            let log_config = spec.log_config.clone().or_else(|| inner.daemon_defaults.clone());
            let created_at = inner.next_id as i64;
            inner.containers.push(FakeContainer {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                log_config,
                state: FakeState::Exited(0),
                logs: Vec::new(),
                created_at,
            });
            Ok(id)
        })
    }

    fn start_container<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let idx = Self::position(&inner, container_id)?;
            let seq = Self::sequence_for(&inner, &inner.containers[idx].image);

            if let Some(lc) = inner.containers[idx].log_config.clone() {
                if inner.plugins.get(&lc.driver).is_some_and(|p| p.enabled) {
                    self.create_spool(&lc)?;
                }
            }

            let mut lines: Vec<String> = seq.lines().collect();
            let total = lines.len();
            let limit = inner.emit_limit.unwrap_or(usize::MAX);
            let running = total > limit;
            lines.truncate(limit);
            self.emit(&mut inner, idx, lines, total);

            inner.containers[idx].state = if running {
                FakeState::Running
            } else {
                FakeState::Exited(inner.exit_code)
            };
            Ok(())
        })
    }

    fn wait_container<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, i64> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let idx = Self::position(&inner, container_id)?;
            let state = inner.containers[idx].state.clone();
            match state {
                FakeState::Exited(code) => Ok(code),
                FakeState::Running if inner.hold_running => {
                    drop(inner);
                    std::future::pending().await
                }
                FakeState::Running => {
                    let seq = Self::sequence_for(&inner, &inner.containers[idx].image);
                    let done = inner.containers[idx].logs.len();
                    let rest: Vec<String> = seq.lines().skip(done).collect();
                    self.emit(&mut inner, idx, rest, seq.len() as usize);
                    let code = inner.exit_code;
                    inner.containers[idx].state = FakeState::Exited(code);
                    Ok(code)
                }
            }
        })
    }

    fn remove_container<'a>(&'a self, container_id: &'a str, force: bool) -> OpsFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let idx = Self::position(&inner, container_id)?;
            if inner.containers[idx].state == FakeState::Running && !force {
                return Err(DockerError::CommandFailed {
                    command: format!("docker rm {}", container_id),
                    status: "exit status: 1".to_string(),
                    stderr: "cannot remove a running container".to_string(),
                });
            }
            inner.containers.remove(idx);
            Ok(())
        })
    }

    fn list_latest_containers(&self, limit: usize) -> OpsFuture<'_, Vec<ContainerRef>> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            Ok(inner
                .containers
                .iter()
                .rev()
                .take(limit)
                .map(|c| ContainerRef {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    image: c.image.clone(),
                    created_at: c.created_at,
                })
                .collect())
        })
    }

    fn container_logs<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, Vec<String>> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            let idx = Self::position(&inner, container_id)?;
            let mut logs = inner.containers[idx].logs.clone();
            if inner.swap_driver_lines && logs.len() >= 2 {
                logs.swap(0, 1);
            }
            Ok(logs)
        })
    }

    fn plugin_enabled<'a>(&'a self, plugin: &'a str) -> OpsFuture<'a, bool> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            inner
                .plugins
                .get(plugin)
                .map(|p| p.enabled)
                .ok_or_else(|| DockerError::PluginNotFound(plugin.to_string()))
        })
    }

    fn set_plugin_enabled<'a>(&'a self, plugin: &'a str, enabled: bool) -> OpsFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let p = inner
                .plugins
                .get_mut(plugin)
                .ok_or_else(|| DockerError::PluginNotFound(plugin.to_string()))?;
            p.enabled = enabled;
            Ok(())
        })
    }

    fn set_plugin_env<'a>(
        &'a self,
        plugin: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> OpsFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let p = inner
                .plugins
                .get_mut(plugin)
                .ok_or_else(|| DockerError::PluginNotFound(plugin.to_string()))?;
            if p.enabled {
                return Err(DockerError::CommandFailed {
                    command: format!("docker plugin set {}", plugin),
                    status: "exit status: 1".to_string(),
                    stderr: "cannot set on an active plugin, disable plugin before setting"
                        .to_string(),
                });
            }
            p.env.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn restart_daemon(&self) -> OpsFuture<'_, ()> {
        Box::pin(async move {
            let defaults = match &self.daemon_file {
                Some(file) => file.read().await?,
                None => None,
            };
            let mut inner = self.inner.lock().await;
            inner.daemon_defaults = defaults.map(|d| LogConfig {
                driver: d.log_driver,
                options: d.log_opts,
            });
            inner.restarts += 1;
            Ok(())
        })
    }
}
