//! Scenario module — catalog, runner and reporting.

pub mod catalog;
pub mod report;
pub mod runner;

pub use catalog::{catalog, select, Scenario};
pub use report::{Phase, RunSummary, ScenarioError, ScenarioResult, Step};
pub use runner::ScenarioRunner;
