//! Mock logz.io ingestion endpoint.
//!
//! Stands in for the remote log-collection service during delivery tests:
//! accepts bulk batches from the logging driver, keeps every received
//! record, and records ingestion-side errors.

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{IngestError, ListenerError};
pub use server::{ListenerHandle, MockListener};
pub use state::{ListenerState, ReceivedRecord};
