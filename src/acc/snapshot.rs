//! Point-in-time observations of remote entities

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier used to re-fetch a remote entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An attribute value as observed on the remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Cardinality of a collection value; scalars have none
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(items.len()),
            Value::Object(fields) => Some(fields.len()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in failure messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => write!(f, "[{} items]", items.len()),
            Value::Object(fields) => write!(f, "{{{} fields}}", fields.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Immutable snapshot of a remote entity: its identifier plus attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    id: Identifier,
    attributes: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn new(id: Identifier, attributes: BTreeMap<String, Value>) -> Self {
        Self { id, attributes }
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Attribute keys whose values differ between two snapshots, ignoring
    /// the listed keys. Keys present on only one side count as differing.
    pub fn diff(&self, other: &Snapshot, ignore: &[String]) -> Vec<String> {
        let mut keys: Vec<&String> = self
            .attributes
            .keys()
            .chain(other.attributes.keys())
            .filter(|k| !ignore.contains(*k))
            .collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter(|k| self.attributes.get(*k) != other.attributes.get(*k))
            .cloned()
            .collect()
    }
}

/// Builder for snapshots, used by fetchers
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    attributes: BTreeMap<String, Value>,
}

impl SnapshotBuilder {
    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self, id: Identifier) -> Snapshot {
        Snapshot::new(id, self.attributes)
    }
}
