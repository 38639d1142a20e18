// Module structure for the logzio driver harness.

// Docker access
pub mod docker;
pub mod client;

// Harness core
pub mod line;
pub mod generator;
pub mod driver;
pub mod facade;
pub mod verify;
pub mod settle;
pub mod scenario;

// Process setup
pub mod runtime;
pub mod conf;
