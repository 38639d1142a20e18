//! Runner — drives one scenario at a time through build, run, observe,
//! verify and cleanup.
//!
//! Scenarios never overlap: the listener is reset before each one and every
//! image and container it created is removed before the next one starts,
//! whatever the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::client::docker::ContainerOps;
use crate::conf::HarnessConfig;
use crate::docker::client::DockerError;
use crate::driver::{ContainerDriver, ContainerHandle, DriverConfig, Stability};
use crate::facade::ListenerFacade;
use crate::line::ExpectedSequence;
use crate::scenario::catalog::{Scenario, Surface};
use crate::scenario::report::{Phase, RunSummary, ScenarioError, ScenarioResult, Step};
use crate::settle::Backoff;
use crate::verify;

pub struct ScenarioRunner<'a> {
    driver: ContainerDriver,
    listener: &'a dyn ListenerFacade,
    settle: Backoff,
    exit_timeout: Duration,
    quiet_period: Duration,
    kill_after: Duration,
    max_cleanup_failures: u32,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(
        ops: Arc<dyn ContainerOps>,
        listener: &'a dyn ListenerFacade,
        config: &HarnessConfig,
    ) -> Self {
        Self {
            driver: ContainerDriver::new(ops, config),
            listener,
            settle: Backoff::from_config(&config.settle),
            exit_timeout: Duration::from_secs(config.settle.container_exit_timeout_secs),
            quiet_period: Duration::from_millis(config.settle.quiet_period_ms),
            kill_after: Duration::from_millis(config.scenarios.kill_after_ms),
            max_cleanup_failures: config.scenarios.max_cleanup_failures,
        }
    }

    pub fn driver(&self) -> &ContainerDriver {
        &self.driver
    }

    /// Run `scenarios` in order. Stops early once `max_cleanup_failures`
    /// consecutive scenarios failed to clean up after themselves.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut consecutive_cleanup_failures = 0;

        for scenario in scenarios {
            let result = self.run(scenario).await;
            if result.cleanup.is_clean() {
                consecutive_cleanup_failures = 0;
            } else {
                consecutive_cleanup_failures += 1;
            }
            summary.results.push(result);

            if consecutive_cleanup_failures >= self.max_cleanup_failures {
                error!(
                    failures = consecutive_cleanup_failures,
                    "Repeated cleanup failures, halting the run"
                );
                summary.halted = true;
                break;
            }
        }
        summary
    }

    pub async fn run(&self, scenario: &Scenario) -> ScenarioResult {
        info!(scenario = %scenario.name, containers = scenario.containers.len(), "Scenario started");
        let started = Instant::now();
        self.listener.reset();

        let mut phases = Vec::new();
        let outcome = self.execute(scenario, &mut phases).await;
        // Once containers ran, every outcome is a recorded verdict
        if phases.contains(&Phase::Running) {
            phases.push(Phase::Verified);
        }

        let cleanup = self.driver.cleanup().await;
        phases.push(Phase::CleanedUp);

        match &outcome {
            Ok(()) => info!(scenario = %scenario.name, "Scenario passed"),
            Err(e) => warn!(scenario = %scenario.name, step = e.step(), "Scenario failed: {}", e),
        }

        ScenarioResult {
            name: scenario.name.to_string(),
            outcome,
            phases,
            cleanup,
            elapsed: started.elapsed(),
        }
    }

    fn driver_config(&self, scenario: &Scenario, token: &str) -> DriverConfig {
        DriverConfig {
            token: token.to_string(),
            url: self.listener.url(),
            dir_path: scenario.dir_path.clone(),
        }
    }

    async fn execute(&self, scenario: &Scenario, phases: &mut Vec<Phase>) -> Result<(), ScenarioError> {
        if scenario.surface == Surface::DaemonDefaults {
            let token = scenario.tokens().first().copied().unwrap_or_default();
            self.driver
                .install_daemon_defaults(&self.driver_config(scenario, token))
                .await
                .map_err(ScenarioError::setup(Step::DaemonConfig))?;
        }

        // ── Build ───────────────────────────────────────────────
        let mut images = Vec::with_capacity(scenario.containers.len());
        for plan in &scenario.containers {
            let image = self
                .driver
                .build(&plan.image)
                .await
                .map_err(ScenarioError::setup(Step::Build))?;
            images.push(image);
        }
        phases.push(Phase::Built);

        // ── Run (back to back) ──────────────────────────────────
        let mut handles = Vec::with_capacity(images.len());
        for (plan, image) in scenario.containers.iter().zip(&images) {
            let config = match scenario.surface {
                Surface::LogOptions => Some(self.driver_config(scenario, &plan.token)),
                Surface::DaemonDefaults => None,
            };
            let handle = self
                .driver
                .run(image, config.as_ref(), scenario.mode)
                .await
                .map_err(ScenarioError::setup(Step::Run))?;
            handles.push(handle);
        }
        phases.push(Phase::Running);

        if scenario.kill {
            return self.kill_and_verify(scenario, &handles, phases).await;
        }

        // ── Stable ──────────────────────────────────────────────
        for handle in &handles {
            match self
                .driver
                .await_stable(handle, self.exit_timeout)
                .await
                .map_err(ScenarioError::observation(Step::Wait))?
            {
                Stability::Exited(0) => {}
                Stability::Exited(code) => {
                    return Err(ScenarioError::Setup {
                        step: Step::Run,
                        source: DockerError::ContainerExited {
                            id: handle.id.clone(),
                            code,
                        },
                    })
                }
                Stability::StillRunning => {
                    return Err(ScenarioError::Observation {
                        step: Step::Wait,
                        reason: format!(
                            "container {} still running after {:?}",
                            handle.name, self.exit_timeout
                        ),
                    })
                }
            }
        }
        phases.push(Phase::Stable);

        let settled = self
            .settle
            .until(|| {
                handles
                    .iter()
                    .all(|h| h.expected.lines().all(|l| self.listener.has_received(&l)))
            })
            .await;
        debug!(scenario = %scenario.name, ?settled, "Listener settled");

        // ── Observe ─────────────────────────────────────────────
        let listed = self
            .driver
            .latest_containers(handles.len())
            .await
            .map_err(ScenarioError::observation(Step::Enumerate))?;
        let listed_ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
        let started_ids: Vec<&str> = handles.iter().map(|h| h.id.as_str()).collect();
        if listed_ids != started_ids {
            return Err(ScenarioError::Observation {
                step: Step::Enumerate,
                reason: format!(
                    "latest containers {:?} do not match the started ones {:?}",
                    listed_ids, started_ids
                ),
            });
        }

        let mut driver_logs = Vec::with_capacity(listed.len());
        for container in &listed {
            let logs = self
                .driver
                .read_logs(&container.id)
                .await
                .map_err(ScenarioError::observation(Step::LogRead))?;
            driver_logs.push(logs);
        }

        // ── Verify ──────────────────────────────────────────────
        self.verify(scenario, &handles, &driver_logs).await
    }

    async fn verify(
        &self,
        scenario: &Scenario,
        handles: &[ContainerHandle],
        driver_logs: &[Vec<String>],
    ) -> Result<(), ScenarioError> {
        for (handle, logs) in handles.iter().zip(driver_logs) {
            verify::check_container(&handle.expected, logs, self.listener)?;
        }

        let expected: Vec<ExpectedSequence> = handles.iter().map(|h| h.expected.clone()).collect();
        let received: Vec<String> = scenario
            .tokens()
            .into_iter()
            .flat_map(|token| self.listener.received_for_token(token))
            .collect();
        verify::check_union(&expected, &received)?;

        if scenario.tokens().len() > 1 {
            for (i, (plan, handle)) in scenario.containers.iter().zip(handles).enumerate() {
                let others: Vec<(&str, &ExpectedSequence)> = scenario
                    .containers
                    .iter()
                    .zip(handles)
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, (p, h))| (p.token.as_str(), &h.expected))
                    .collect();
                verify::check_attribution(
                    &plan.token,
                    &handle.expected,
                    &others,
                    &self.listener.received_for_token(&plan.token),
                )?;
            }
        }

        self.verify_delivery_side(scenario).await
    }

    /// Listener-side error and the plugin's queue directory.
    async fn verify_delivery_side(&self, scenario: &Scenario) -> Result<(), ScenarioError> {
        verify::check_listener_error(self.listener)?;
        let lookup = self
            .driver
            .locate_spool(&scenario.dir_path)
            .await
            .map_err(ScenarioError::observation(Step::QueueDirectory))?;
        verify::check_spool(&scenario.dir_path, &lookup)?;
        Ok(())
    }

    async fn verify_killed(
        &self,
        scenario: &Scenario,
        handles: &[ContainerHandle],
        observed: &[Option<Vec<String>>],
    ) -> Result<(), ScenarioError> {
        for ((plan, handle), driver_logs) in scenario.containers.iter().zip(handles).zip(observed) {
            let received = self.listener.received_for_token(&plan.token);
            info!(
                container = %handle.name,
                driver_lines = driver_logs.as_ref().map(Vec::len),
                received = received.len(),
                "Killed container observed"
            );
            verify::check_killed(&handle.expected, driver_logs.as_deref(), &received, self.listener)?;
        }
        self.verify_delivery_side(scenario).await
    }

    /// Let the container write for a while, force-remove it, then check that
    /// whatever was delivered belongs to its sequence.
    async fn kill_and_verify(
        &self,
        scenario: &Scenario,
        handles: &[ContainerHandle],
        phases: &mut Vec<Phase>,
    ) -> Result<(), ScenarioError> {
        tokio::time::sleep(self.kill_after).await;
        for handle in handles {
            self.driver
                .kill(handle)
                .await
                .map_err(ScenarioError::setup(Step::Kill))?;
        }
        phases.push(Phase::Killed);

        let settled = self
            .settle
            .until_quiet(self.quiet_period, || self.listener.received_count())
            .await;
        debug!(scenario = %scenario.name, ?settled, "Listener quiet after kill");

        let mut observed = Vec::with_capacity(handles.len());
        for handle in handles {
            // The log store usually goes with the container
            let driver_logs = match self.driver.read_driver_logs(handle).await {
                Ok(logs) => Some(logs),
                Err(DockerError::ContainerNotFound(_)) => None,
                Err(e) => return Err(ScenarioError::observation(Step::LogRead)(e)),
            };
            observed.push(driver_logs);
        }

        self.verify_killed(scenario, handles, &observed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{Delivery, FakeEngine};
    use crate::conf::ScenarioConfig;
    use crate::docker::daemon::DaemonConfigFile;
    use crate::scenario::catalog::catalog;
    use crate::verify::Failure;
    use listener::config::ServerConfig;
    use listener::{ListenerHandle, MockListener};

    struct Fixture {
        engine: Arc<FakeEngine>,
        listener: ListenerHandle,
        config: HarnessConfig,
        scenarios: Vec<Scenario>,
        dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.docker.plugin_state_root = dir.path().display().to_string();
        config.docker.daemon_config_path = dir.path().join("daemon.json").display().to_string();
        config.settle.initial_interval_ms = 5;
        config.settle.max_interval_ms = 20;
        config.settle.timeout_secs = 1;
        config.settle.container_exit_timeout_secs = 1;
        config.settle.quiet_period_ms = 30;
        config.scenarios = ScenarioConfig {
            kill_after_ms: 5,
            ..ScenarioConfig::default()
        };

        let listener = MockListener::start(&ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        })
        .await
        .unwrap();

        let engine = Arc::new(
            FakeEngine::new(listener.state().clone())
                .with_plugin(&config.plugin.name)
                .with_spool_root(dir.path().join("plugins"))
                .with_daemon_config(dir.path().join("daemon.json")),
        );
        let scenarios = catalog(&config.scenarios);
        Fixture {
            engine,
            listener,
            config,
            scenarios,
            dir,
        }
    }

    impl Fixture {
        fn runner(&self) -> ScenarioRunner<'_> {
            ScenarioRunner::new(self.engine.clone(), &self.listener, &self.config)
        }

        fn scenario(&self, name: &str) -> &Scenario {
            self.scenarios.iter().find(|s| s.name == name).unwrap()
        }

        async fn assert_nothing_left(&self) {
            assert_eq!(self.engine.live_containers().await, 0);
            assert!(self.engine.images().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_single_container_passes() {
        let f = fixture().await;
        let result = f.runner().run(f.scenario("single_container")).await;

        assert!(result.passed(), "{}", result);
        assert_eq!(
            result.phases,
            vec![
                Phase::Built,
                Phase::Running,
                Phase::Stable,
                Phase::Verified,
                Phase::CleanedUp
            ]
        );
        assert_eq!(f.listener.state().received_count(), 100);
        f.assert_nothing_left().await;
    }

    #[tokio::test]
    async fn test_multi_container_scenarios_pass() {
        let f = fixture().await;
        let runner = f.runner();

        let same = runner.run(f.scenario("multi_same_token")).await;
        assert!(same.passed(), "{}", same);
        assert_eq!(f.scenario("multi_same_token").containers.len(), 5);
        assert_eq!(f.listener.state().messages_for_token("token").len(), 50);
        assert_eq!(f.listener.state().received_count(), 50);

        let distinct = runner.run(f.scenario("multi_distinct_tokens")).await;
        assert!(distinct.passed(), "{}", distinct);
        assert_eq!(f.listener.state().messages_for_token("token1").len(), 10);
        f.assert_nothing_left().await;
    }

    #[tokio::test]
    async fn test_kill_container_passes() {
        let f = fixture().await;
        f.engine.set_emit_limit(Some(20)).await;
        let result = f.runner().run(f.scenario("kill_container")).await;

        assert!(result.passed(), "{}", result);
        assert_eq!(
            result.phases,
            vec![
                Phase::Built,
                Phase::Running,
                Phase::Killed,
                Phase::Verified,
                Phase::CleanedUp
            ]
        );
        assert_eq!(f.listener.state().received_count(), 20);
    }

    #[tokio::test]
    async fn test_kill_container_duplicate_delivery_fails() {
        let f = fixture().await;
        f.engine.set_emit_limit(Some(20)).await;
        f.engine.set_delivery(Delivery::DuplicateFirst).await;
        let result = f.runner().run(f.scenario("kill_container")).await;

        assert_eq!(
            result.outcome.unwrap_err().to_string(),
            "line-match: \"test_kill_container_0\" received 2 times"
        );
    }

    #[tokio::test]
    async fn test_daemon_global_config_passes_and_restores() {
        let f = fixture().await;
        let result = f.runner().run(f.scenario("daemon_global_config")).await;

        assert!(result.passed(), "{}", result);
        assert_eq!(f.engine.restarts().await, 2);
        let daemon_file = DaemonConfigFile::new(f.dir.path().join("daemon.json"));
        assert!(daemon_file.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lost_lines_fail_and_still_clean_up() {
        let f = fixture().await;
        f.engine.set_delivery(Delivery::DropLast(2)).await;
        let result = f.runner().run(f.scenario("single_container")).await;

        match &result.outcome {
            Err(ScenarioError::Verification(Failure::Disagreement {
                driver: None,
                listener: Some(missing),
                ..
            })) => {
                assert_eq!(missing.line, "test_98");
                assert_eq!(missing.total_missing, 2);
            }
            other => panic!("Expected listener-side disagreement, got {:?}", other),
        }
        assert_eq!(result.phases.last(), Some(&Phase::CleanedUp));
        assert!(result.phases.contains(&Phase::Verified));
        f.assert_nothing_left().await;
    }

    #[tokio::test]
    async fn test_wait_failure_still_records_verdict() {
        let f = fixture().await;
        f.engine.set_emit_limit(Some(4)).await;
        f.engine.set_hold_running(true).await;
        let result = f.runner().run(f.scenario("multi_same_token")).await;

        assert_eq!(result.outcome.as_ref().unwrap_err().step(), "wait");
        assert_eq!(
            result.phases,
            vec![
                Phase::Built,
                Phase::Running,
                Phase::Verified,
                Phase::CleanedUp
            ]
        );
        f.assert_nothing_left().await;
    }

    #[tokio::test]
    async fn test_duplicate_delivery_fails() {
        let f = fixture().await;
        f.engine.set_delivery(Delivery::DuplicateFirst).await;
        let result = f.runner().run(f.scenario("multi_same_token")).await;

        assert!(matches!(
            result.outcome,
            Err(ScenarioError::Verification(Failure::Duplicate { count: 2, .. }))
        ));
    }

    #[tokio::test]
    async fn test_reordered_driver_log_is_disagreement() {
        let f = fixture().await;
        f.engine.swap_driver_lines(true).await;
        let result = f.runner().run(f.scenario("single_container")).await;

        match &result.outcome {
            Err(ScenarioError::Verification(Failure::Disagreement {
                driver: Some(divergence),
                listener: None,
                ..
            })) => assert_eq!(divergence.index, 0),
            other => panic!("Expected driver-side disagreement, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_failure_reports_build_step() {
        let f = fixture().await;
        f.engine.fail_build("test_one_container:latest").await;
        let result = f.runner().run(f.scenario("single_container")).await;

        assert_eq!(result.outcome.as_ref().unwrap_err().step(), "build");
        assert_eq!(result.phases, vec![Phase::CleanedUp]);
        assert!(result.to_string().starts_with("FAIL single_container"));
    }

    #[tokio::test]
    async fn test_disabled_plugin_fails_line_match() {
        let f = fixture().await;
        f.engine.set_plugin_state(&f.config.plugin.name, false).await;
        let result = f.runner().run(f.scenario("single_container")).await;

        // Lines never reach the listener either; the first failure wins
        assert!(result.outcome.is_err());
        assert_eq!(result.outcome.as_ref().unwrap_err().step(), "line-match");
    }

    #[tokio::test]
    async fn test_missing_queue_directory_fails() {
        let f = fixture().await;
        let engine = Arc::new(
            FakeEngine::new(f.listener.state().clone()).with_plugin(&f.config.plugin.name),
        );
        let runner = ScenarioRunner::new(engine, &f.listener, &f.config);
        let result = runner.run(f.scenario("single_container")).await;

        assert_eq!(result.outcome.as_ref().unwrap_err().step(), "queue-directory");
    }

    #[tokio::test]
    async fn test_run_halts_after_repeated_cleanup_failures() {
        let f = fixture().await;
        f.engine.fail_remove_image(true).await;
        let summary = f.runner().run_all(&f.scenarios).await;

        assert!(summary.halted);
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.passed(), 2);
        assert!(!summary.success());
    }

    #[tokio::test]
    async fn test_run_all_resets_listener_between_scenarios() {
        let f = fixture().await;
        let picked: Vec<Scenario> = f
            .scenarios
            .iter()
            .filter(|s| s.name == "single_container" || s.name == "daemon_global_config")
            .cloned()
            .collect();
        let summary = f.runner().run_all(&picked).await;

        assert!(summary.success(), "{:?}", summary);
        // Only the last scenario's lines remain
        assert_eq!(f.listener.state().received_count(), 100);
        assert!(f.listener.state().has_received("test_daemon_global_configuration_99"));
        assert!(!f.listener.state().has_received("test_0"));
    }
}
