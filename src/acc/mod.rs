//! Acceptance-test core
//!
//! Drives multi-step lifecycle scenarios (create, import, update, destroy)
//! against a remote through two collaborators:
//!
//! - a [`Provisioner`] that applies declarative configuration and is
//!   responsible for convergence before it returns
//! - a [`Fetcher`] that reads remote entities into immutable [`Snapshot`]s
//!
//! Each step's [`Assertion`]s run against a fresh snapshot; after the last
//! step the runner tears everything down and checks that every resource the
//! scenario created is gone.

mod assertion;
mod destroy;
mod remote;
mod runner;
mod snapshot;
mod step;

pub use assertion::{compose, AssertResult, Assertion, AssertionFailure, CheckInput, Locals};
pub use destroy::DestroyVerifier;
pub use remote::{Address, Fetcher, IdentifierSet, ImportRef, Provisioner};
pub use runner::{run_all, Harness, Scenario, ScenarioReport, ScenarioRunner};
pub use snapshot::{Identifier, Snapshot, SnapshotBuilder, Value};
pub use step::{ScenarioContext, Step, StepExecutor, StepKind};
