use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use harness::client::docker::ContainerOps;
use harness::conf::HarnessConfig;
use harness::runtime::boot;
use harness::scenario::{catalog, select, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(
    name = "harness",
    version,
    about = "End-to-end delivery checks for the logz.io Docker logging driver"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scenarios against the local Docker daemon
    Run {
        /// Scenario to run (repeatable); all of them when omitted
        #[arg(short, long = "scenario")]
        scenarios: Vec<String>,
        /// Config file (overrides HARNESS_CONFIG_FILE)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Leave the plugin's settings and enabled state alone
        #[arg(long)]
        skip_plugin_setup: bool,
    },
    /// List the known scenarios
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            for scenario in catalog(&HarnessConfig::default().scenarios) {
                println!("{:<24} {}", scenario.name, scenario.description);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            scenarios,
            config,
            skip_plugin_setup,
        } => {
            boot::init_logging();
            run(scenarios, config, skip_plugin_setup).await
        }
    }
}

async fn run(
    names: Vec<String>,
    config_path: Option<PathBuf>,
    skip_plugin_setup: bool,
) -> anyhow::Result<ExitCode> {
    let booted = boot::boot(config_path.as_deref())
        .await
        .map_err(|e| anyhow!("Boot failed: {}", e))?;
    let scenarios = select(catalog(&booted.config.scenarios), &names).map_err(anyhow::Error::msg)?;

    let ops: Arc<dyn ContainerOps> = Arc::new(booted.docker);
    let summary = {
        let runner = ScenarioRunner::new(ops, &booted.listener, &booted.config);
        if skip_plugin_setup {
            info!("Skipping plugin setup");
        } else {
            runner
                .driver()
                .prepare_plugin()
                .await
                .context("Plugin setup failed")?;
        }
        runner.run_all(&scenarios).await
    };

    for result in &summary.results {
        println!("{}", result);
    }
    println!(
        "{} passed, {} failed{}",
        summary.passed(),
        summary.failed(),
        if summary.halted {
            " (halted after repeated cleanup failures)"
        } else {
            ""
        }
    );

    booted
        .listener
        .shutdown()
        .await
        .context("Failed to stop the mock listener")?;

    if summary.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failed = summary.failed(), halted = summary.halted, "Run failed");
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_repeated_scenarios() {
        let cli = Cli::try_parse_from([
            "harness",
            "run",
            "--scenario",
            "single_container",
            "-s",
            "kill_container",
            "--skip-plugin-setup",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                scenarios,
                config,
                skip_plugin_setup,
            } => {
                assert_eq!(scenarios, vec!["single_container", "kill_container"]);
                assert!(config.is_none());
                assert!(skip_plugin_setup);
            }
            other => panic!("Expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["harness"]).is_err());
    }
}
