//! Docker module — bollard client, CLI helper, plugin and daemon-config management.

pub mod client;
pub mod container;
pub mod daemon;
pub mod image;
pub mod inventory;
pub mod plugin;
pub mod spool;

pub use client::{DockerClient, DockerError};
