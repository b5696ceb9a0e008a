//! CLI command handling
//!
//! Dispatches CLI commands to the scenario runner and formats output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::acc::Harness;
use crate::commands::Commands;
use crate::common::{Config, Error, Result};
use crate::sim::{SimCloud, SimProvider};
use crate::testing::{self, Output, RenderContext, TestResult};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            paths,
            verbose,
            config,
            read_lag,
            sequential,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(read_lag) = read_lag {
                config.sim.read_lag = read_lag;
            }
            if sequential {
                config.run.parallel = false;
            }
            run(&paths, &config, verbose, json).await
        }

        Commands::Check { paths } => check(&paths),

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

async fn run(paths: &[PathBuf], config: &Config, verbose: bool, json: bool) -> Result<()> {
    let cloud = SimCloud::new(config.sim.clone());
    let token = CancellationToken::new();

    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, tearing down");
            interrupt.cancel();
        }
    });

    // One provider per scenario: tracked state is never shared
    let harness_for = |cloud: &SimCloud| {
        let provider = Arc::new(SimProvider::new(cloud.clone()));
        Harness::new(provider.clone(), provider).with_destroy_config(config.destroy.clone())
    };

    // stdout carries only the JSON document with --json
    let output = if json {
        Output::Quiet
    } else {
        Output::Report { verbose }
    };

    let results: Vec<Result<TestResult>> = if config.run.parallel {
        join_all(paths.iter().map(|path| {
            testing::run_scenario_file(path, harness_for(&cloud), output, token.child_token())
        }))
        .await
    } else {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let result =
                testing::run_scenario_file(path, harness_for(&cloud), output, token.child_token())
                    .await;
            results.push(result);
        }
        results
    };

    if json {
        return summarize_json(paths, results);
    }
    summarize(paths, results)
}

fn summarize_json(paths: &[PathBuf], results: Vec<Result<TestResult>>) -> Result<()> {
    let total = results.len();
    let results: Vec<TestResult> = paths
        .iter()
        .zip(results)
        .map(|(path, result)| {
            result.unwrap_or_else(|e| TestResult {
                name: path.display().to_string(),
                passed: false,
                steps_run: 0,
                steps_total: 0,
                error: Some(e.to_string()),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&results)?);

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        return Err(Error::ScenariosFailed { failed, total });
    }
    Ok(())
}

fn summarize(paths: &[PathBuf], results: Vec<Result<TestResult>>) -> Result<()> {
    let total = results.len();
    let mut failed = 0;

    println!("{}", "Summary:".cyan());
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(result) if result.passed => {
                println!(
                    "  {} {} ({}/{} steps)",
                    "✓".green(),
                    result.name,
                    result.steps_run,
                    result.steps_total
                );
            }
            Ok(result) => {
                failed += 1;
                println!(
                    "  {} {}: {}",
                    "✗".red(),
                    result.name,
                    result.error.unwrap_or_default().red()
                );
            }
            Err(e) => {
                failed += 1;
                println!("  {} {}: {}", "✗".red(), path.display(), e.to_string().red());
            }
        }
    }

    if failed > 0 {
        return Err(Error::ScenariosFailed { failed, total });
    }
    Ok(())
}

fn check(paths: &[PathBuf]) -> Result<()> {
    let mut failed = 0;

    for path in paths {
        let outcome = testing::load_scenario(path)
            .and_then(|scenario| scenario.build(RenderContext::new()));
        match outcome {
            Ok(scenario) => println!(
                "  {} {}: {} ({} steps)",
                "✓".green(),
                path.display(),
                scenario.name(),
                scenario.len()
            ),
            Err(e) => {
                failed += 1;
                println!("  {} {}: {}", "✗".red(), path.display(), e.to_string().red());
            }
        }
    }

    if failed > 0 {
        return Err(Error::ScenariosFailed {
            failed,
            total: paths.len(),
        });
    }
    Ok(())
}
