//! In-memory networking API holding security groups
//!
//! Deletions can lag: with `read_lag = N`, a deleted group stays readable
//! for N more reads, like a remote whose read replicas trail its writes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::acc::Identifier;
use crate::common::config::SimConfig;
use crate::common::{Error, Result};

/// A security group rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: String,
    pub direction: String,
    pub ethertype: String,
    pub protocol: Option<String>,
    pub port_range_min: Option<i64>,
    pub port_range_max: Option<i64>,
    pub remote_ip_prefix: Option<String>,
    pub remote_group_id: Option<String>,
}

/// A security group as stored by the API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecGroup {
    pub id: Identifier,
    pub name: String,
    pub description: String,
    pub enterprise_project_id: String,
    pub rules: Vec<Rule>,
}

/// Fields accepted when creating a group
#[derive(Debug, Clone, Default)]
pub struct CreateOpts {
    pub name: String,
    pub description: String,
    pub enterprise_project_id: String,
    pub delete_default_rules: bool,
}

/// API operations that faults can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct CloudState {
    groups: HashMap<Identifier, SecGroup>,
    /// Deleted groups still visible to reads, with remaining read count
    lagging: HashMap<Identifier, (SecGroup, u32)>,
    faults: VecDeque<(Op, String)>,
    calls: HashMap<&'static str, usize>,
}

/// Shared handle to one simulated region
#[derive(Debug, Clone)]
pub struct SimCloud {
    state: Arc<Mutex<CloudState>>,
    config: SimConfig,
}

impl Default for SimCloud {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimCloud {
    pub fn new(config: SimConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CloudState::default())),
            config,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CloudState>> {
        self.state
            .lock()
            .map_err(|_| Error::transport("simulated cloud state poisoned"))
    }

    /// Make the next matching operation fail with a transport error
    pub fn inject_fault(&self, op: Op, message: &str) {
        if let Ok(mut state) = self.lock() {
            state.faults.push_back((op, message.to_string()));
        }
    }

    /// Number of API calls made for an operation
    pub fn calls(&self, op: Op) -> usize {
        self.lock()
            .map(|state| state.calls.get(op_name(op)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of groups currently stored (excluding lagging deletions)
    pub fn len(&self) -> usize {
        self.lock().map(|state| state.groups.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enter(&self, op: Op) -> Result<MutexGuard<'_, CloudState>> {
        let mut state = self.lock()?;
        *state.calls.entry(op_name(op)).or_insert(0) += 1;
        if let Some(pos) = state.faults.iter().position(|(o, _)| *o == op) {
            if let Some((_, message)) = state.faults.remove(pos) {
                return Err(Error::Transport(message));
            }
        }
        Ok(state)
    }

    pub fn create(&self, opts: CreateOpts) -> Result<SecGroup> {
        let mut state = self.enter(Op::Create)?;

        let id = Identifier::new(format!("sg-{}", uuid::Uuid::new_v4().simple()));
        let rules = if opts.delete_default_rules || !self.config.default_rules {
            Vec::new()
        } else {
            default_rules(&id)
        };
        let group = SecGroup {
            id: id.clone(),
            name: opts.name,
            description: opts.description,
            enterprise_project_id: if opts.enterprise_project_id.is_empty() {
                "0".to_string()
            } else {
                opts.enterprise_project_id
            },
            rules,
        };

        tracing::debug!("sim: created security group {} ({})", id, group.name);
        state.groups.insert(id, group.clone());
        Ok(group)
    }

    pub fn update(&self, id: &Identifier, name: &str, description: &str) -> Result<SecGroup> {
        let mut state = self.enter(Op::Update)?;
        let group = state.groups.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        group.name = name.to_string();
        group.description = description.to_string();
        tracing::debug!("sim: updated security group {}", id);
        Ok(group.clone())
    }

    pub fn delete(&self, id: &Identifier) -> Result<()> {
        let mut state = self.enter(Op::Delete)?;
        let group = state.groups.remove(id).ok_or_else(|| Error::not_found(id))?;
        if self.config.read_lag > 0 {
            state.lagging.insert(id.clone(), (group, self.config.read_lag));
        }
        tracing::debug!("sim: deleted security group {}", id);
        Ok(())
    }

    pub fn get(&self, id: &Identifier) -> Result<SecGroup> {
        let mut state = self.enter(Op::Get)?;
        if let Some(group) = state.groups.get(id) {
            return Ok(group.clone());
        }

        if let Some((group, remaining)) = state.lagging.get_mut(id) {
            *remaining -= 1;
            let group = group.clone();
            if *remaining == 0 {
                state.lagging.remove(id);
            }
            return Ok(group);
        }
        Err(Error::not_found(id))
    }
}

fn op_name(op: Op) -> &'static str {
    match op {
        Op::Get => "get",
        Op::Create => "create",
        Op::Update => "update",
        Op::Delete => "delete",
    }
}

/// The rules every new group carries unless asked not to: egress to
/// anywhere and ingress from the group itself for both IP versions, plus
/// SSH and RDP from anywhere.
fn default_rules(group: &Identifier) -> Vec<Rule> {
    let rule = |n: usize,
                direction: &str,
                ethertype: &str,
                protocol: Option<&str>,
                port: Option<i64>,
                remote_ip: Option<&str>,
                remote_group: bool| Rule {
        id: format!("{}-rule-{}", group, n),
        direction: direction.to_string(),
        ethertype: ethertype.to_string(),
        protocol: protocol.map(str::to_string),
        port_range_min: port,
        port_range_max: port,
        remote_ip_prefix: remote_ip.map(str::to_string),
        remote_group_id: remote_group.then(|| group.to_string()),
    };

    vec![
        rule(1, "egress", "IPv4", None, None, None, false),
        rule(2, "egress", "IPv6", None, None, None, false),
        rule(3, "ingress", "IPv4", None, None, None, true),
        rule(4, "ingress", "IPv6", None, None, None, true),
        rule(5, "ingress", "IPv4", Some("tcp"), Some(22), Some("0.0.0.0/0"), false),
        rule(6, "ingress", "IPv4", Some("tcp"), Some(3389), Some("0.0.0.0/0"), false),
    ]
}
