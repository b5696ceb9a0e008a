//! Collaborator interfaces: the provisioning engine and the remote reader
//!
//! The harness never talks to a cloud API directly. It drives a
//! [`Provisioner`] to mutate remote state and a [`Fetcher`] to observe it.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::snapshot::{Identifier, Snapshot};
use crate::common::Result;

/// Resource address inside a configuration, e.g. `networking_secgroup.secgroup_1`
pub type Address = String;

/// Identifiers produced by an apply, keyed by resource address
pub type IdentifierSet = BTreeMap<Address, Identifier>;

/// Reference to an existing remote entity to adopt into tracked state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub address: Address,
    pub id: Identifier,
}

/// Read-only access to remote entities
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current state of an entity.
    ///
    /// Returns `Error::NotFound` when the entity does not exist and
    /// `Error::Transport` for network or auth failures.
    async fn fetch(&self, id: &Identifier) -> Result<Snapshot>;
}

/// The declarative engine that applies configuration
///
/// `apply` and `destroy` must not return before their effects are
/// observable through the matching [`Fetcher`].
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Apply configuration text, returning every tracked resource's identifier
    async fn apply(&self, config: &str) -> Result<IdentifierSet>;

    /// Adopt an existing remote entity into tracked state
    async fn import_resource(&self, reference: &ImportRef) -> Result<Identifier>;

    /// Remove the given resources
    async fn destroy(&self, ids: &[Identifier]) -> Result<()>;
}
