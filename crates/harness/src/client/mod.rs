//! Client module — the seam between the driver and a Docker engine.

pub mod docker;
pub mod fake;
pub mod live;
