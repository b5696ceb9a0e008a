//! Simulated cloud for running scenarios without a real provider
//!
//! Implements both collaborator traits over an in-memory security-group
//! API. Used by the CLI and by the integration tests.

mod cloud;
mod config;
mod provider;

pub use cloud::{CreateOpts, Op, Rule, SecGroup, SimCloud};
pub use config::{parse, ResourceBlock};
pub use provider::{SimProvider, SECGROUP_TYPE};
