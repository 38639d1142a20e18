//! Live — implements `ContainerOps` for the real `DockerClient`.

use crate::client::docker::{ContainerOps, OpsFuture};
use crate::docker::client::DockerClient;
use crate::docker::image::ImageBuild;
use crate::docker::inventory::{ContainerRef, ContainerSpec};

impl ContainerOps for DockerClient {
    // ── Images ──────────────────────────────────────────────────

    fn build_image<'a>(&'a self, build: &'a ImageBuild) -> OpsFuture<'a, ()> {
        Box::pin(self.build_image(build))
    }

    fn remove_image<'a>(&'a self, image: &'a str) -> OpsFuture<'a, ()> {
        Box::pin(self.remove_image(image, true))
    }

    // ── Container lifecycle ─────────────────────────────────────

    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> OpsFuture<'a, String> {
        Box::pin(self.create_container(spec))
    }

    fn start_container<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, ()> {
        Box::pin(self.start_container(container_id))
    }

    fn wait_container<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, i64> {
        Box::pin(self.wait_container(container_id))
    }

    fn remove_container<'a>(&'a self, container_id: &'a str, force: bool) -> OpsFuture<'a, ()> {
        Box::pin(self.remove_container(container_id, force))
    }

    // ── Observation ─────────────────────────────────────────────

    fn list_latest_containers(&self, limit: usize) -> OpsFuture<'_, Vec<ContainerRef>> {
        Box::pin(self.list_latest_containers(limit))
    }

    fn container_logs<'a>(&'a self, container_id: &'a str) -> OpsFuture<'a, Vec<String>> {
        Box::pin(self.container_logs(container_id))
    }

    // ── Plugin & daemon ─────────────────────────────────────────

    fn plugin_enabled<'a>(&'a self, plugin: &'a str) -> OpsFuture<'a, bool> {
        Box::pin(self.plugin_enabled(plugin))
    }

    fn set_plugin_enabled<'a>(&'a self, plugin: &'a str, enabled: bool) -> OpsFuture<'a, ()> {
        Box::pin(self.set_plugin_enabled(plugin, enabled))
    }

    fn set_plugin_env<'a>(
        &'a self,
        plugin: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> OpsFuture<'a, ()> {
        Box::pin(self.set_plugin_env(plugin, key, value))
    }

    fn restart_daemon(&self) -> OpsFuture<'_, ()> {
        Box::pin(self.restart_daemon())
    }
}
