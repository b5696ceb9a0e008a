//! Test runner implementation
//!
//! Loads YAML scenarios, renders their templates into harness scenarios and
//! prints colored results.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::acc::{Assertion, Harness, Scenario, ScenarioReport, ScenarioRunner, Step, Value};
use crate::common::{Error, Result};

use super::config::{Expectation, TestScenario, TestStep};
use super::render::RenderContext;

/// Result of a test run
#[derive(Debug, Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

impl From<&ScenarioReport> for TestResult {
    fn from(report: &ScenarioReport) -> Self {
        Self {
            name: report.name.clone(),
            passed: report.passed(),
            steps_run: report.steps_run,
            steps_total: report.steps_total,
            error: report.first_failure().map(|e| e.to_string()),
        }
    }
}

/// Load and parse a scenario file
pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    serde_yaml::from_str(&content).map_err(|e| Error::ScenarioParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

impl TestScenario {
    /// Render templates and convert into a runnable scenario
    pub fn build(&self, mut ctx: RenderContext) -> Result<Scenario> {
        let invalid = |e: Error| Error::Harness(format!("{}: {}", self.name, e));

        let mut scenario = Scenario::new(&self.name);
        for var in &self.precheck {
            scenario = scenario.precheck(var);
        }
        // Templates may read the precheck variables
        scenario.check_env()?;

        for (key, value) in &self.vars {
            let key = key
                .as_str()
                .ok_or_else(|| invalid(Error::Template("variable names must be strings".into())))?;
            let template = match value {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(invalid(Error::Template(format!(
                        "variable '{}' must be a scalar",
                        key
                    ))))
                }
            };
            let rendered = ctx.render(&template).map_err(invalid)?;
            ctx.set(key, rendered);
        }

        for test_step in &self.steps {
            let step = match test_step {
                TestStep::Apply {
                    config,
                    target,
                    bind,
                    expect_replacement,
                    expect,
                } => {
                    let mut step = Step::apply(ctx.render(config).map_err(invalid)?);
                    if let Some(target) = target {
                        step = step.target(target);
                    }
                    if *expect_replacement {
                        step = step.expect_replacement();
                    }
                    with_checks(step, bind, expect, &ctx).map_err(invalid)?
                }
                TestStep::Import {
                    address,
                    verify_ignore,
                    bind,
                    expect,
                } => {
                    let mut step = Step::import(address);
                    for key in verify_ignore {
                        step = step.ignore(key);
                    }
                    with_checks(step, bind, expect, &ctx).map_err(invalid)?
                }
                TestStep::Destroy => Step::destroy(),
            };
            scenario = scenario.step(step);
        }

        Ok(scenario)
    }
}

fn with_checks(
    mut step: Step,
    bind: &[String],
    expect: &[Expectation],
    ctx: &RenderContext,
) -> Result<Step> {
    for expectation in expect {
        step = step.check(to_assertion(expectation, ctx)?);
    }
    for local in bind {
        step = step.bind(local);
    }
    Ok(step)
}

fn to_assertion(expectation: &Expectation, ctx: &RenderContext) -> Result<Assertion> {
    Ok(match expectation {
        Expectation::AttrEquals { key, value } => {
            let value = match value {
                Value::Str(s) => Value::Str(ctx.render(s)?),
                other => other.clone(),
            };
            Assertion::AttrEquals {
                key: key.clone(),
                value,
            }
        }
        Expectation::AttrExists(key) => Assertion::attr_exists(key),
        Expectation::AttrLen { key, len } => Assertion::attr_len(key, *len),
        Expectation::IdUnchanged(local) => Assertion::id_unchanged(local),
        Expectation::IdChanged(local) => Assertion::id_changed(local),
    })
}

/// How much of a run is printed to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Per-step report
    Report { verbose: bool },
    /// Nothing; the caller prints a machine-readable summary
    Quiet,
}

/// Run a loaded scenario and print its result
///
/// Cancelling `token` stops the remaining steps; teardown still runs.
pub async fn run_scenario(
    scenario: &TestScenario,
    harness: Harness,
    output: Output,
    token: CancellationToken,
) -> Result<TestResult> {
    let built = scenario.build(RenderContext::new())?;
    let runner = ScenarioRunner::new(harness);

    let report = runner.run_with_cancel(&built, token).await;
    if let Output::Report { verbose } = output {
        print_report(scenario, &built, &report, verbose);
    }

    Ok(TestResult::from(&report))
}

/// Run a scenario file end to end
pub async fn run_scenario_file(
    path: &Path,
    harness: Harness,
    output: Output,
    token: CancellationToken,
) -> Result<TestResult> {
    let scenario = load_scenario(path)?;
    run_scenario(&scenario, harness, output, token).await
}

fn print_report(scenario: &TestScenario, built: &Scenario, report: &ScenarioReport, verbose: bool) {
    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    println!("\n{}", "Steps:".cyan());
    for (i, step) in built.iter().enumerate().take(report.steps_run) {
        let label = step.to_string();

        if report.failed_step == Some(i) {
            let message = report
                .failure
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            println!("  {} Step {}: {}", "✗".red(), i + 1, label);
            println!("      {}", message.red());
        } else {
            println!("  {} Step {}: {}", "✓".green(), i + 1, label.dimmed());
        }
    }

    if verbose && !report.created.is_empty() {
        let ids: Vec<String> = report.created.iter().map(|id| id.to_string()).collect();
        println!("  Created: {}", ids.join(", ").dimmed());
    }

    if report.failure.is_some() && report.failed_step.is_none() {
        if let Some(e) = &report.failure {
            println!("  {} {}", "✗".red(), e.to_string().red());
        }
    }

    for e in &report.cleanup_failures {
        println!("  {} Teardown: {}", "✗".red(), e.to_string().red());
    }

    if report.passed() {
        println!(
            "\n{} {}\n",
            "✓".green().bold(),
            "Test Passed".green().bold()
        );
    } else {
        println!("\n{} {}\n", "✗".red().bold(), "Test Failed".red().bold());
    }
}
