//! Scenario steps and their execution
//!
//! A step triggers one remote effect through the provisioner, observes the
//! result through the fetcher, and runs its composed assertions. A single
//! observation is trusted: the provisioner guarantees convergence before
//! `apply` returns, so nothing here polls.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::assertion::{compose, Assertion, CheckInput, Locals};
use super::remote::{Address, Fetcher, ImportRef, Provisioner};
use super::snapshot::{Identifier, Snapshot};
use crate::common::{Error, Result};

/// What a step does to the remote
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Apply configuration text; `target` selects the resource to observe
    Apply {
        config: String,
        target: Option<Address>,
    },
    /// Import the resource tracked at `address` and verify the round trip
    Import {
        address: Address,
        verify_ignore: Vec<String>,
    },
    /// Destroy every tracked resource
    Destroy,
}

/// One immutable step of a scenario
#[derive(Debug, Clone)]
pub struct Step {
    kind: StepKind,
    assertions: Vec<Assertion>,
    bind: Vec<String>,
    expect_replacement: bool,
}

impl Step {
    fn new(kind: StepKind) -> Self {
        Self {
            kind,
            assertions: Vec::new(),
            bind: Vec::new(),
            expect_replacement: false,
        }
    }

    pub fn apply(config: impl Into<String>) -> Self {
        Self::new(StepKind::Apply {
            config: config.into(),
            target: None,
        })
    }

    pub fn import(address: &str) -> Self {
        Self::new(StepKind::Import {
            address: address.to_string(),
            verify_ignore: Vec::new(),
        })
    }

    pub fn destroy() -> Self {
        Self::new(StepKind::Destroy)
    }

    /// Resource address to observe after an apply
    pub fn target(mut self, address: &str) -> Self {
        if let StepKind::Apply { target, .. } = &mut self.kind {
            *target = Some(address.to_string());
        }
        self
    }

    /// Attribute excluded from import verification
    pub fn ignore(mut self, key: &str) -> Self {
        if let StepKind::Import { verify_ignore, .. } = &mut self.kind {
            verify_ignore.push(key.to_string());
        }
        self
    }

    pub fn check(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn checks(mut self, assertions: impl IntoIterator<Item = Assertion>) -> Self {
        self.assertions.extend(assertions);
        self
    }

    /// Bind the observed identifier to a local once the step's assertions pass
    pub fn bind(mut self, local: &str) -> Self {
        self.bind.push(local.to_string());
        self
    }

    /// Allow the observed resource to be replaced by this step
    pub fn expect_replacement(mut self) -> Self {
        self.expect_replacement = true;
        self
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    /// Reject step definitions that cannot be executed
    pub fn validate(&self) -> std::result::Result<(), String> {
        match &self.kind {
            StepKind::Destroy if !self.assertions.is_empty() || !self.bind.is_empty() => Err(
                "destroy steps observe nothing; absence is checked after teardown".to_string(),
            ),
            StepKind::Apply { config, .. } if config.trim().is_empty() => {
                Err("apply step has empty configuration".to_string())
            }
            StepKind::Import { address, .. } if address.is_empty() => {
                Err("import step has empty resource address".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StepKind::Apply {
                target: Some(target),
                ..
            } => write!(f, "apply ({})", target),
            StepKind::Apply { target: None, .. } => write!(f, "apply"),
            StepKind::Import { address, .. } => write!(f, "import ({})", address),
            StepKind::Destroy => write!(f, "destroy"),
        }
    }
}

/// Mutable state owned by one running scenario
#[derive(Debug, Default)]
pub struct ScenarioContext {
    locals: Locals,
    prior: Option<Snapshot>,
    tracked: BTreeMap<Address, Snapshot>,
    created: BTreeSet<Identifier>,
    retired: BTreeSet<Identifier>,
}

impl ScenarioContext {
    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    /// Snapshot observed by the most recent step
    pub fn prior(&self) -> Option<&Snapshot> {
        self.prior.as_ref()
    }

    pub fn tracked(&self, address: &str) -> Option<&Snapshot> {
        self.tracked.get(address)
    }

    /// Every identifier the scenario ever observed being created
    pub fn created(&self) -> Vec<Identifier> {
        self.created.iter().cloned().collect()
    }

    /// Created identifiers that have not been destroyed or replaced
    pub fn live(&self) -> Vec<Identifier> {
        self.created.difference(&self.retired).cloned().collect()
    }

    fn retire(&mut self, id: &Identifier) {
        self.retired.insert(id.clone());
    }
}

/// Runs single steps against the collaborators
pub struct StepExecutor<'a> {
    provisioner: &'a dyn Provisioner,
    fetcher: &'a dyn Fetcher,
}

impl<'a> StepExecutor<'a> {
    pub fn new(provisioner: &'a dyn Provisioner, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            provisioner,
            fetcher,
        }
    }

    /// Execute one step; `index` is the step's position in its scenario
    pub async fn execute(&self, index: usize, step: &Step, ctx: &mut ScenarioContext) -> Result<()> {
        tracing::debug!("Step {}: {}", index, step);

        step.validate()
            .map_err(|e| Error::Harness(format!("step {}: {}", index, e)))?;

        match &step.kind {
            StepKind::Apply { config, target } => {
                self.execute_apply(index, step, config, target.as_deref(), ctx)
                    .await
            }
            StepKind::Import {
                address,
                verify_ignore,
            } => {
                self.execute_import(index, step, address, verify_ignore, ctx)
                    .await
            }
            StepKind::Destroy => self.execute_destroy(ctx).await,
        }
    }

    async fn execute_apply(
        &self,
        index: usize,
        step: &Step,
        config: &str,
        target: Option<&str>,
        ctx: &mut ScenarioContext,
    ) -> Result<()> {
        let applied = self.provisioner.apply(config).await?;
        ctx.created.extend(applied.values().cloned());

        // Addresses dropped from the configuration were destroyed by the apply
        let dropped: Vec<Address> = ctx
            .tracked
            .keys()
            .filter(|address| !applied.contains_key(*address))
            .cloned()
            .collect();
        for address in dropped {
            if let Some(old) = ctx.tracked.remove(&address) {
                ctx.retire(old.id());
            }
        }

        let target = match target {
            Some(address) => address.to_string(),
            None if applied.len() == 1 => applied.keys().next().cloned().unwrap_or_default(),
            None if step.assertions.is_empty() && step.bind.is_empty() => String::new(),
            None => {
                return Err(Error::Harness(format!(
                    "step {}: apply produced {} resources; set a target to run assertions",
                    index,
                    applied.len()
                )))
            }
        };

        let mut observed = None;
        for (address, id) in &applied {
            let snapshot = self.observe(index, address, id).await?;

            if let Some(old) = ctx.tracked.get(address) {
                if old.id() != id {
                    if !step.expect_replacement {
                        return Err(Error::assertion(
                            index,
                            format!(
                                "{}: resource was replaced ({} -> {})",
                                address,
                                old.id(),
                                id
                            ),
                        ));
                    }
                    let old_id = old.id().clone();
                    ctx.retire(&old_id);
                }
            }

            if *address == target {
                observed = Some(snapshot.clone());
            }
            ctx.tracked.insert(address.clone(), snapshot);
        }

        if target.is_empty() {
            return Ok(());
        }

        let current = observed.ok_or_else(|| {
            Error::Harness(format!(
                "step {}: target '{}' is not in the applied configuration",
                index, target
            ))
        })?;

        self.settle(index, step, current, ctx)
    }

    async fn execute_import(
        &self,
        index: usize,
        step: &Step,
        address: &str,
        verify_ignore: &[String],
        ctx: &mut ScenarioContext,
    ) -> Result<()> {
        let tracked = ctx.tracked.get(address).cloned().ok_or_else(|| {
            Error::Harness(format!(
                "step {}: cannot import '{}', no earlier step created it",
                index, address
            ))
        })?;

        let reference = ImportRef {
            address: address.to_string(),
            id: tracked.id().clone(),
        };
        let imported = self.provisioner.import_resource(&reference).await?;
        if imported != reference.id {
            return Err(Error::assertion(
                index,
                format!(
                    "{}: import returned {}, expected {}",
                    address, imported, reference.id
                ),
            ));
        }

        let current = self.observe(index, address, &imported).await?;

        let differing = tracked.diff(&current, verify_ignore);
        if !differing.is_empty() {
            let details: Vec<String> = differing
                .iter()
                .map(|key| {
                    format!(
                        "{} ({} != {})",
                        key,
                        display_attr(&tracked, key),
                        display_attr(&current, key)
                    )
                })
                .collect();
            return Err(Error::assertion(
                index,
                format!(
                    "{}: imported state differs from applied state: {}",
                    address,
                    details.join(", ")
                ),
            ));
        }

        ctx.tracked.insert(address.to_string(), current.clone());
        self.settle(index, step, current, ctx)
    }

    async fn execute_destroy(&self, ctx: &mut ScenarioContext) -> Result<()> {
        let ids: Vec<Identifier> = ctx.tracked.values().map(|s| s.id().clone()).collect();
        self.provisioner.destroy(&ids).await?;

        for id in &ids {
            ctx.retire(id);
        }
        ctx.tracked.clear();
        Ok(())
    }

    /// Fetch a resource that a step just produced. Absence here means the
    /// provisioner broke its convergence contract, which is a test failure.
    async fn observe(&self, index: usize, address: &str, id: &Identifier) -> Result<Snapshot> {
        match self.fetcher.fetch(id).await {
            Ok(snapshot) if snapshot.id() == id => Ok(snapshot),
            Ok(snapshot) => Err(Error::assertion(
                index,
                format!(
                    "{}: fetched {} but got entity {}",
                    address,
                    id,
                    snapshot.id()
                ),
            )),
            Err(e) if e.is_not_found() => Err(Error::assertion(
                index,
                format!("{}: resource {} not found", address, id),
            )),
            Err(e) => Err(e),
        }
    }

    /// Run the step's assertions against a fresh observation, then capture
    fn settle(&self, index: usize, step: &Step, current: Snapshot, ctx: &mut ScenarioContext) -> Result<()> {
        let assertion = compose(step.assertions.iter().cloned());
        let input = CheckInput {
            current: &current,
            prior: ctx.prior.as_ref(),
            locals: &ctx.locals,
        };
        assertion
            .check(&input)
            .map_err(|failure| Error::assertion(index, failure.message))?;

        for local in &step.bind {
            ctx.locals.bind(local, current.id().clone());
        }
        ctx.prior = Some(current);
        Ok(())
    }
}

fn display_attr(snapshot: &Snapshot, key: &str) -> String {
    snapshot
        .get(key)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unset".to_string())
}
