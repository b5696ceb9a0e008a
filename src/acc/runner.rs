//! Scenario sequencing, teardown and reporting

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use super::destroy::DestroyVerifier;
use super::remote::{Fetcher, Provisioner};
use super::snapshot::Identifier;
use super::step::{ScenarioContext, Step, StepExecutor};
use crate::common::config::DestroyConfig;
use crate::common::{Error, Result};

/// One end-to-end lifecycle test
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    steps: Vec<Step>,
    precheck: Vec<String>,
}

impl Scenario {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
            precheck: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Require an environment variable to be set before anything runs
    pub fn precheck(mut self, var: &str) -> Self {
        self.precheck.push(var.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn preflight(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Harness(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        self.check_env()
    }

    /// Fail unless every precheck variable is set and non-empty
    pub(crate) fn check_env(&self) -> Result<()> {
        let missing: Vec<&str> = self
            .precheck
            .iter()
            .filter(|var| std::env::var(var.as_str()).map(|v| v.is_empty()).unwrap_or(true))
            .map(|var| var.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Harness(format!(
                "scenario '{}' requires environment variables: {}",
                self.name,
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// The collaborators a runner works against
///
/// Passed explicitly so independent runners never share hidden state.
#[derive(Clone)]
pub struct Harness {
    provisioner: Arc<dyn Provisioner>,
    fetcher: Arc<dyn Fetcher>,
    destroy: DestroyConfig,
}

impl Harness {
    pub fn new(provisioner: Arc<dyn Provisioner>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            provisioner,
            fetcher,
            destroy: DestroyConfig::default(),
        }
    }

    pub fn with_destroy_config(mut self, destroy: DestroyConfig) -> Self {
        self.destroy = destroy;
        self
    }
}

/// Result of running one scenario
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    pub steps_total: usize,
    pub steps_run: usize,
    /// Index of the step that failed, if any
    pub failed_step: Option<usize>,
    /// First failure; authoritative when present
    pub failure: Option<Error>,
    /// Teardown and destroy-verification failures
    pub cleanup_failures: Vec<Error>,
    /// Every identifier the scenario created
    pub created: Vec<Identifier>,
}

impl ScenarioReport {
    fn preflight_failure(scenario: &Scenario, error: Error) -> Self {
        Self {
            name: scenario.name.clone(),
            steps_total: scenario.steps.len(),
            steps_run: 0,
            failed_step: None,
            failure: Some(error),
            cleanup_failures: Vec::new(),
            created: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.cleanup_failures.is_empty()
    }

    /// The first failure: a step failure wins over any cleanup failure
    pub fn first_failure(&self) -> Option<&Error> {
        self.failure.as_ref().or_else(|| self.cleanup_failures.first())
    }

    /// Convert into a result carrying the authoritative failure
    pub fn into_result(mut self) -> Result<()> {
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }
        if !self.cleanup_failures.is_empty() {
            return Err(self.cleanup_failures.remove(0));
        }
        Ok(())
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.first_failure(), self.failed_step) {
            (None, _) => write!(
                f,
                "{}: passed ({}/{} steps)",
                self.name, self.steps_run, self.steps_total
            ),
            (Some(e), Some(step)) => write!(f, "{}: failed at step {}: {}", self.name, step, e),
            (Some(e), None) => write!(f, "{}: failed: {}", self.name, e),
        }
    }
}

/// Run independent scenarios concurrently, each against its own harness
///
/// Reports come back in input order.
pub async fn run_all(runs: &[(Harness, Scenario)]) -> Vec<ScenarioReport> {
    join_all(runs.iter().map(|(harness, scenario)| async move {
        ScenarioRunner::new(harness.clone()).run(scenario).await
    }))
    .await
}

/// Runs scenarios against a [`Harness`]
pub struct ScenarioRunner {
    harness: Harness,
}

impl ScenarioRunner {
    pub fn new(harness: Harness) -> Self {
        Self { harness }
    }

    /// Run a scenario to completion, including teardown
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        self.run_with_cancel(scenario, CancellationToken::new()).await
    }

    /// Run a scenario; cancelling `token` aborts the remaining steps but
    /// teardown and destroy verification are still attempted.
    pub async fn run_with_cancel(
        &self,
        scenario: &Scenario,
        token: CancellationToken,
    ) -> ScenarioReport {
        if let Err(e) = scenario.preflight() {
            tracing::warn!("Scenario '{}' rejected: {}", scenario.name, e);
            return ScenarioReport::preflight_failure(scenario, e);
        }

        tracing::info!(
            "Running scenario '{}' ({} steps)",
            scenario.name,
            scenario.steps.len()
        );

        let executor = StepExecutor::new(
            self.harness.provisioner.as_ref(),
            self.harness.fetcher.as_ref(),
        );
        let mut ctx = ScenarioContext::default();
        let mut failure = None;
        let mut failed_step = None;
        let mut steps_run = 0;

        for (index, step) in scenario.steps.iter().enumerate() {
            if token.is_cancelled() {
                tracing::warn!(
                    "Scenario '{}' cancelled before step {} ({})",
                    scenario.name,
                    index,
                    step
                );
                failure = Some(Error::Cancelled);
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = executor.execute(index, step, &mut ctx) => result,
            };
            steps_run = index + 1;

            if let Err(e) = outcome {
                if e.is_test_failure() {
                    tracing::warn!("Scenario '{}' step {} ({}) failed: {}", scenario.name, index, step, e);
                } else {
                    tracing::error!(
                        "Scenario '{}' step {} ({}) errored: {}",
                        scenario.name,
                        index,
                        step,
                        e
                    );
                }
                failed_step = Some(index);
                failure = Some(e);
                break;
            }
        }

        let cleanup_failures = self.teardown(&scenario.name, &ctx).await;

        let report = ScenarioReport {
            name: scenario.name.clone(),
            steps_total: scenario.steps.len(),
            steps_run,
            failed_step,
            failure,
            cleanup_failures,
            created: ctx.created(),
        };

        if report.passed() {
            tracing::info!("{}", report);
        } else {
            tracing::error!("{}", report);
        }
        report
    }

    /// Destroy whatever is still live, then confirm everything ever created
    /// is gone. Runs exactly once per scenario.
    async fn teardown(&self, name: &str, ctx: &ScenarioContext) -> Vec<Error> {
        let mut failures = Vec::new();

        let live = ctx.live();
        tracing::debug!("Tearing down '{}': {} live resources", name, live.len());
        if let Err(e) = self.harness.provisioner.destroy(&live).await {
            tracing::warn!("Teardown of '{}' failed: {}", name, e);
            failures.push(e);
        }

        let verifier = DestroyVerifier::new(self.harness.fetcher.as_ref(), &self.harness.destroy);
        if let Err(e) = verifier.verify_absent(&ctx.created()).await {
            tracing::warn!("Destroy check for '{}' failed: {}", name, e);
            failures.push(e);
        }

        failures
    }
}
