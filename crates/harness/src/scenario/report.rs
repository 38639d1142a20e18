//! Report — scenario outcomes, the step that failed and the run summary.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::docker::client::DockerError;
use crate::driver::CleanupReport;
use crate::verify::Failure;

/// The step a scenario was executing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    DaemonConfig,
    Build,
    Run,
    Wait,
    Kill,
    Enumerate,
    LogRead,
    LineMatch,
    QueueDirectory,
    Cleanup,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::DaemonConfig => "daemon-config",
            Step::Build => "build",
            Step::Run => "run",
            Step::Wait => "wait",
            Step::Kill => "kill",
            Step::Enumerate => "enumerate",
            Step::LogRead => "log-read",
            Step::LineMatch => "line-match",
            Step::QueueDirectory => "queue-directory",
            Step::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one scenario: `Built → Running → (Stable | Killed) →
/// Verified → CleanedUp`. Once containers are running every outcome, pass or
/// fail, is recorded as `Verified`. A failure before that jumps straight to
/// `CleanedUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Built,
    Running,
    Stable,
    Killed,
    Verified,
    CleanedUp,
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    /// A driving command failed; the plugin was never properly exercised.
    #[error("{step}: {source}")]
    Setup {
        step: Step,
        #[source]
        source: DockerError,
    },
    /// The harness could not observe the outcome.
    #[error("{step}: {reason}")]
    Observation { step: Step, reason: String },
    /// The plugin did not deliver what the containers emitted.
    #[error("{}: {}", .0.step(), .0)]
    Verification(#[from] Failure),
}

impl ScenarioError {
    pub fn setup(step: Step) -> impl FnOnce(DockerError) -> Self {
        move |source| ScenarioError::Setup { step, source }
    }

    pub fn observation(step: Step) -> impl FnOnce(DockerError) -> Self {
        move |e| ScenarioError::Observation {
            step,
            reason: e.to_string(),
        }
    }

    pub fn step(&self) -> &'static str {
        match self {
            ScenarioError::Setup { step, .. } | ScenarioError::Observation { step, .. } => {
                step.as_str()
            }
            ScenarioError::Verification(failure) => failure.step(),
        }
    }
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: Result<(), ScenarioError>,
    /// Every phase the scenario went through, in order.
    pub phases: Vec<Phase>,
    pub cleanup: CleanupReport,
    pub elapsed: Duration,
}

impl ScenarioResult {
    /// Cleanup failures are reported but do not change the verdict.
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Human-readable reason naming the failed step, if anything failed.
    pub fn reason(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Err(e) = &self.outcome {
            parts.push(e.to_string());
        }
        if !self.cleanup.is_clean() {
            parts.push(format!("{}: {}", Step::Cleanup, self.cleanup.failures.join("; ")));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        write!(f, "{} {} ({:.1}s)", verdict, self.name, self.elapsed.as_secs_f64())?;
        if let Some(reason) = self.reason() {
            write!(f, " - {}", reason)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<ScenarioResult>,
    /// The run stopped early after repeated cleanup failures.
    pub halted: bool,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn success(&self) -> bool {
        !self.halted && self.failed() == 0
    }
}
