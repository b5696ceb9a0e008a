//! Provisioning engine and fetcher backed by [`SimCloud`]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::cloud::{CreateOpts, SecGroup, SimCloud};
use super::config::{parse, ResourceBlock};
use crate::acc::{
    Address, Fetcher, Identifier, IdentifierSet, ImportRef, Provisioner, Snapshot,
    SnapshotBuilder, Value,
};
use crate::common::{Error, Result};

/// The only resource type the simulated cloud manages
pub const SECGROUP_TYPE: &str = "networking_secgroup";

const KNOWN_ATTRS: &[&str] = &[
    "name",
    "description",
    "enterprise_project_id",
    "delete_default_rules",
];

/// Project the remote reports when none was configured
const DEFAULT_PROJECT: &str = "0";

/// Attributes whose change forces a new group
const FORCE_NEW: &[&str] = &["enterprise_project_id", "delete_default_rules"];

#[derive(Debug, Clone)]
struct Tracked {
    id: Identifier,
    block: ResourceBlock,
}

/// Declarative engine over the simulated cloud
///
/// Each instance keeps its own tracked state, so concurrent scenarios use
/// separate providers over a shared [`SimCloud`].
#[derive(Debug)]
pub struct SimProvider {
    cloud: SimCloud,
    tracked: Mutex<BTreeMap<Address, Tracked>>,
}

impl SimProvider {
    pub fn new(cloud: SimCloud) -> Self {
        Self {
            cloud,
            tracked: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn cloud(&self) -> &SimCloud {
        &self.cloud
    }

    fn tracked(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Address, Tracked>>> {
        self.tracked
            .lock()
            .map_err(|_| Error::transport("provider state poisoned"))
    }

    fn create(&self, block: &ResourceBlock) -> Result<Identifier> {
        let group = self.cloud.create(CreateOpts {
            name: block.str_attr("name").unwrap_or_default().to_string(),
            description: block.str_attr("description").unwrap_or_default().to_string(),
            enterprise_project_id: block
                .str_attr("enterprise_project_id")
                .unwrap_or_default()
                .to_string(),
            delete_default_rules: block.bool_attr("delete_default_rules").unwrap_or(false),
        })?;
        Ok(group.id)
    }

    /// Bring one resource in line with its block
    fn reconcile(&self, block: &ResourceBlock, existing: Option<&Tracked>) -> Result<Change> {
        let Some(existing) = existing else {
            return self.create(block).map(Change::Created);
        };

        let force_new = FORCE_NEW
            .iter()
            .any(|key| existing.block.attrs.get(*key) != block.attrs.get(*key));
        if force_new {
            tracing::debug!("sim: replacing {} ({})", block.address(), existing.id);
            delete_tolerant(&self.cloud, &existing.id)?;
            return self.create(block).map(Change::Created);
        }

        if existing.block.attrs != block.attrs {
            self.cloud.update(
                &existing.id,
                block.str_attr("name").unwrap_or_default(),
                block.str_attr("description").unwrap_or_default(),
            )?;
        }
        Ok(Change::Kept(existing.id.clone()))
    }
}

/// What reconciling one block did to the remote
enum Change {
    Created(Identifier),
    Kept(Identifier),
}

fn validate(block: &ResourceBlock) -> Result<()> {
    if block.rtype != SECGROUP_TYPE {
        return Err(Error::transport(format!(
            "apply rejected: unsupported resource type '{}'",
            block.rtype
        )));
    }
    if block.str_attr("name").map(str::is_empty).unwrap_or(true) {
        return Err(Error::transport(format!(
            "apply rejected: {}: 'name' is required",
            block.address()
        )));
    }
    if let Some(key) = block.attrs.keys().find(|k| !KNOWN_ATTRS.contains(&k.as_str())) {
        return Err(Error::transport(format!(
            "apply rejected: {}: unsupported argument '{}'",
            block.address(),
            key
        )));
    }
    Ok(())
}

/// Deleting something already gone is not an error for the engine
fn delete_tolerant(cloud: &SimCloud, id: &Identifier) -> Result<()> {
    match cloud.delete(id) {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

fn snapshot(group: SecGroup) -> Snapshot {
    let rules = group
        .rules
        .into_iter()
        .map(|rule| {
            let mut fields = BTreeMap::new();
            fields.insert("id".to_string(), Value::Str(rule.id));
            fields.insert("direction".to_string(), Value::Str(rule.direction));
            fields.insert("ethertype".to_string(), Value::Str(rule.ethertype));
            if let Some(protocol) = rule.protocol {
                fields.insert("protocol".to_string(), Value::Str(protocol));
            }
            if let Some(min) = rule.port_range_min {
                fields.insert("port_range_min".to_string(), Value::Int(min));
            }
            if let Some(max) = rule.port_range_max {
                fields.insert("port_range_max".to_string(), Value::Int(max));
            }
            if let Some(prefix) = rule.remote_ip_prefix {
                fields.insert("remote_ip_prefix".to_string(), Value::Str(prefix));
            }
            if let Some(remote) = rule.remote_group_id {
                fields.insert("remote_group_id".to_string(), Value::Str(remote));
            }
            Value::Object(fields)
        })
        .collect();

    SnapshotBuilder::default()
        .attr("name", group.name)
        .attr("description", group.description)
        .attr("enterprise_project_id", group.enterprise_project_id)
        .attr("rules", Value::List(rules))
        .build(group.id)
}

#[async_trait]
impl Provisioner for SimProvider {
    async fn apply(&self, config: &str) -> Result<IdentifierSet> {
        let blocks = parse(config).map_err(|e| Error::transport(format!("apply rejected: {}", e)))?;
        for block in &blocks {
            validate(block)?;
        }

        let mut tracked = self.tracked()?;
        let wanted: HashSet<String> = blocks.iter().map(ResourceBlock::address).collect();

        let dropped: Vec<Address> = tracked
            .keys()
            .filter(|address| !wanted.contains(*address))
            .cloned()
            .collect();
        for address in dropped {
            if let Some(old) = tracked.remove(&address) {
                tracing::debug!("sim: {} removed from configuration", address);
                delete_tolerant(&self.cloud, &old.id)?;
            }
        }

        let mut applied = IdentifierSet::new();
        let mut created: Vec<(Address, Identifier)> = Vec::new();
        for block in blocks {
            let address = block.address();
            let id = match self.reconcile(&block, tracked.get(&address)) {
                Ok(Change::Created(id)) => {
                    created.push((address.clone(), id.clone()));
                    id
                }
                Ok(Change::Kept(id)) => id,
                Err(e) => {
                    // Groups created by a failed apply never reach the caller
                    for (address, id) in created {
                        tracing::debug!("sim: rolling back {} ({})", address, id);
                        if let Err(err) = delete_tolerant(&self.cloud, &id) {
                            tracing::warn!("sim: rollback of {} failed: {}", id, err);
                        }
                        tracked.remove(&address);
                    }
                    return Err(e);
                }
            };
            tracked.insert(
                address.clone(),
                Tracked {
                    id: id.clone(),
                    block,
                },
            );
            applied.insert(address, id);
        }

        Ok(applied)
    }

    async fn import_resource(&self, reference: &ImportRef) -> Result<Identifier> {
        let group = self.cloud.get(&reference.id)?;

        let (rtype, name) = reference
            .address
            .split_once('.')
            .ok_or_else(|| Error::transport(format!("invalid address '{}'", reference.address)))?;

        let mut tracked = self.tracked()?;
        if tracked
            .get(&reference.address)
            .is_some_and(|existing| existing.id == group.id)
        {
            // Already managed here: the configured block stays authoritative
            return Ok(group.id);
        }

        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), Value::Str(group.name.clone()));
        attrs.insert("description".to_string(), Value::Str(group.description.clone()));
        if group.enterprise_project_id != DEFAULT_PROJECT {
            attrs.insert(
                "enterprise_project_id".to_string(),
                Value::Str(group.enterprise_project_id.clone()),
            );
        }

        tracked.insert(
            reference.address.clone(),
            Tracked {
                id: group.id.clone(),
                block: ResourceBlock {
                    rtype: rtype.to_string(),
                    name: name.to_string(),
                    attrs,
                },
            },
        );
        Ok(group.id)
    }

    async fn destroy(&self, ids: &[Identifier]) -> Result<()> {
        let mut tracked = self.tracked()?;
        for id in ids {
            delete_tolerant(&self.cloud, id)?;
            tracked.retain(|_, t| &t.id != id);
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for SimProvider {
    async fn fetch(&self, id: &Identifier) -> Result<Snapshot> {
        self.cloud.get(id).map(snapshot)
    }
}
