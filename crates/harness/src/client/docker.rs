//! Container operations trait — the only way the driver touches Docker.
//!
//! `live.rs` provides the real Bollard/CLI-backed implementation.
//! `fake.rs` provides an in-memory engine for tests.

use std::future::Future;
use std::pin::Pin;

use crate::docker::client::DockerError;
use crate::docker::image::ImageBuild;
use crate::docker::inventory::{ContainerRef, ContainerSpec};

pub type OpsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DockerError>> + Send + 'a>>;

/// Object-safe thanks to `Pin<Box<…>>` returns.
/// Implementations must be `Send + Sync` so they can live behind an `Arc`.
pub trait ContainerOps: Send + Sync {
    // ── Images ──────────────────────────────────────────────────

    fn build_image<'a>(&'a self, build: &'a ImageBuild) -> OpsFuture<'a, ()>;

    fn remove_image<'a>(&'a self, image: &'a str) -> OpsFuture<'a, ()>;

    // ── Container lifecycle ─────────────────────────────────────

    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> OpsFuture<'a, String>;

    fn start_container<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, ()>;

    /// Resolves with the exit code once the container stops running.
    fn wait_container<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, i64>;

    fn remove_container<'a>(&'a self, container_id: &'a str, force: bool) -> OpsFuture<'a, ()>;

    // ── Observation ─────────────────────────────────────────────

    /// Most recently created first, like `docker ps -a -n <limit>`.
    fn list_latest_containers(&self, limit: usize) -> OpsFuture<'_, Vec<ContainerRef>>;

    fn container_logs<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, Vec<String>>;

    // ── Plugin & daemon ─────────────────────────────────────────

    fn plugin_enabled<'a>(&'a self, plugin: &'a str) -> OpsFuture<'a, bool>;

    fn set_plugin_enabled<'a>(&'a self, plugin: &'a str, enabled: bool) -> OpsFuture<'a, ()>;

    fn set_plugin_env<'a>(
        &'a self,
        plugin: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> OpsFuture<'a, ()>;

    fn restart_daemon(&self) -> OpsFuture<'_, ()>;
}
