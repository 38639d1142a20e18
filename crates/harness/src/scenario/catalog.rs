//! Catalog — the end-to-end cases the harness knows how to run.

use crate::conf::ScenarioConfig;
use crate::driver::{ImagePlan, RunMode};

/// Where the container's log-driver options come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// `--log-driver`/`--log-opt` on each container.
    LogOptions,
    /// Host-wide defaults in the daemon configuration file.
    DaemonDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPlan {
    pub image: ImagePlan,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub containers: Vec<ContainerPlan>,
    /// `logzio-dir-path` shared by every container of the scenario.
    pub dir_path: String,
    pub mode: RunMode,
    pub surface: Surface,
    /// Force-remove the (single) container while it is still writing.
    pub kill: bool,
}

impl Scenario {
    /// Distinct tokens, in container order.
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = Vec::new();
        for c in &self.containers {
            if !tokens.contains(&c.token.as_str()) {
                tokens.push(&c.token);
            }
        }
        tokens
    }
}

fn plan(tag: String, prefix: String, iterations: u64, delay_secs: u64, token: String) -> ContainerPlan {
    ContainerPlan {
        image: ImagePlan {
            tag: format!("{}:latest", tag),
            prefix,
            iterations,
            delay_secs,
        },
        token,
    }
}

pub fn catalog(config: &ScenarioConfig) -> Vec<Scenario> {
    let n = config.containers;
    vec![
        Scenario {
            name: "single_container",
            description: "one container, 100 lines, log options on the run",
            containers: vec![plan(
                "test_one_container".to_string(),
                "test".to_string(),
                100,
                0,
                config.token.clone(),
            )],
            dir_path: "./test_one".to_string(),
            mode: RunMode::Foreground,
            surface: Surface::LogOptions,
            kill: false,
        },
        Scenario {
            name: "multi_same_token",
            description: "concurrent containers shipping under one token",
            containers: (0..n)
                .map(|i| {
                    plan(
                        format!("test_multi_containers_same_logger{}", i),
                        format!("multi_test_containers_same_logger{}", i),
                        10,
                        3,
                        config.token.clone(),
                    )
                })
                .collect(),
            dir_path: "./test_multi_same".to_string(),
            mode: RunMode::Detached,
            surface: Surface::LogOptions,
            kill: false,
        },
        Scenario {
            name: "multi_distinct_tokens",
            description: "concurrent containers, each with its own token",
            containers: (0..n)
                .map(|i| {
                    plan(
                        format!("test_multi_containers_different_logger{}", i),
                        format!("test_multi_containers_different_logger{}", i),
                        10,
                        3,
                        format!("{}{}", config.token, i),
                    )
                })
                .collect(),
            dir_path: "./test_multi_containers_different_logger".to_string(),
            mode: RunMode::Detached,
            surface: Surface::LogOptions,
            kill: false,
        },
        Scenario {
            name: "kill_container",
            description: "container force-removed while writing",
            containers: vec![plan(
                "test_kill_container".to_string(),
                "test_kill_container".to_string(),
                10_000,
                0,
                config.token.clone(),
            )],
            dir_path: "./test_kill_container".to_string(),
            mode: RunMode::Detached,
            surface: Surface::LogOptions,
            kill: true,
        },
        Scenario {
            name: "daemon_global_config",
            description: "plugin configured as the daemon's default log driver",
            containers: vec![plan(
                "test_daemon_global_configuration".to_string(),
                "test_daemon_global_configuration".to_string(),
                100,
                0,
                config.token.clone(),
            )],
            dir_path: "./test_daemon_global_configuration".to_string(),
            mode: RunMode::Foreground,
            surface: Surface::DaemonDefaults,
            kill: false,
        },
    ]
}

/// Pick scenarios by name, keeping catalog order. An empty selection means
/// every scenario.
pub fn select(all: Vec<Scenario>, names: &[String]) -> Result<Vec<Scenario>, String> {
    if let Some(unknown) = names.iter().find(|n| !all.iter().any(|s| s.name == n.as_str())) {
        let known: Vec<&str> = all.iter().map(|s| s.name).collect();
        return Err(format!(
            "unknown scenario '{}' (known: {})",
            unknown,
            known.join(", ")
        ));
    }
    if names.is_empty() {
        return Ok(all);
    }
    Ok(all
        .into_iter()
        .filter(|s| names.iter().any(|n| n == s.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prefixes_unique_within_each_scenario() {
        for scenario in catalog(&ScenarioConfig::default()) {
            let prefixes: HashSet<&str> = scenario
                .containers
                .iter()
                .map(|c| c.image.prefix.as_str())
                .collect();
            assert_eq!(prefixes.len(), scenario.containers.len(), "{}", scenario.name);
        }
    }

    #[test]
    fn test_multi_scenarios_follow_container_count() {
        let config = ScenarioConfig {
            containers: 3,
            ..ScenarioConfig::default()
        };
        let all = catalog(&config);
        let same = all.iter().find(|s| s.name == "multi_same_token").unwrap();
        assert_eq!(same.containers.len(), 3);
        assert_eq!(same.tokens(), vec!["token"]);

        let distinct = all.iter().find(|s| s.name == "multi_distinct_tokens").unwrap();
        assert_eq!(distinct.tokens(), vec!["token0", "token1", "token2"]);
    }

    #[test]
    fn test_single_container_matches_reference_case() {
        let all = catalog(&ScenarioConfig::default());
        let single = &all[0];
        assert_eq!(single.name, "single_container");
        assert_eq!(single.containers[0].image.prefix, "test");
        assert_eq!(single.containers[0].image.iterations, 100);
        assert_eq!(single.dir_path, "./test_one");
    }

    #[test]
    fn test_select_keeps_catalog_order() {
        let names = vec!["kill_container".to_string(), "single_container".to_string()];
        let picked = select(catalog(&ScenarioConfig::default()), &names).unwrap();
        let picked: Vec<&str> = picked.iter().map(|s| s.name).collect();
        assert_eq!(picked, vec!["single_container", "kill_container"]);
    }

    #[test]
    fn test_select_unknown_name() {
        let err = select(catalog(&ScenarioConfig::default()), &["nope".to_string()]).unwrap_err();
        assert!(err.contains("unknown scenario 'nope'"));
        assert_eq!(select(catalog(&ScenarioConfig::default()), &[]).unwrap().len(), 5);
    }
}
