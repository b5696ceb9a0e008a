//! Declarative checks over observed snapshots
//!
//! Assertions are pure: they read the current snapshot, the snapshot seen by
//! the previous step and the scenario's bound locals, and never mutate any of
//! them. [`compose`] turns an ordered list into a single logical AND that
//! stops at the first failure and returns it verbatim.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::snapshot::{Identifier, Snapshot, Value};

/// Failure produced by a single assertion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AssertionFailure {
    pub message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type AssertResult = std::result::Result<(), AssertionFailure>;

/// Named identifier slots captured by earlier steps
///
/// Only the step executor writes here, through a step's `bind` list.
#[derive(Debug, Default, Clone)]
pub struct Locals {
    ids: BTreeMap<String, Identifier>,
}

impl Locals {
    pub fn get(&self, name: &str) -> Option<&Identifier> {
        self.ids.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn bind(&mut self, name: &str, id: Identifier) {
        self.ids.insert(name.to_string(), id);
    }
}

/// Everything an assertion may look at
#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    pub current: &'a Snapshot,
    pub prior: Option<&'a Snapshot>,
    pub locals: &'a Locals,
}

type CustomCheck = dyn Fn(&CheckInput<'_>) -> AssertResult + Send + Sync;

/// A check run after a step's remote effect has settled
#[derive(Clone)]
pub enum Assertion {
    /// Attribute equals a literal value
    AttrEquals { key: String, value: Value },
    /// Attribute is present
    AttrExists { key: String },
    /// Collection attribute has exactly `len` items
    AttrLen { key: String, len: usize },
    /// Identifier equals the one bound to `local`
    IdUnchanged { local: String },
    /// Identifier differs from the one bound to `local`
    IdChanged { local: String },
    /// Ordered conjunction, see [`compose`]
    All(Vec<Assertion>),
    /// Caller-supplied predicate
    Custom { name: String, check: Arc<CustomCheck> },
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttrEquals { key, value } => write!(f, "AttrEquals({:?} = {})", key, value),
            Self::AttrExists { key } => write!(f, "AttrExists({:?})", key),
            Self::AttrLen { key, len } => write!(f, "AttrLen({:?}, {})", key, len),
            Self::IdUnchanged { local } => write!(f, "IdUnchanged({:?})", local),
            Self::IdChanged { local } => write!(f, "IdChanged({:?})", local),
            Self::All(children) => f.debug_list().entries(children).finish(),
            Self::Custom { name, .. } => write!(f, "Custom({:?})", name),
        }
    }
}

/// Combine assertions into one that evaluates them left to right
pub fn compose(assertions: impl IntoIterator<Item = Assertion>) -> Assertion {
    Assertion::All(assertions.into_iter().collect())
}

impl Assertion {
    pub fn attr_equals(key: &str, value: impl Into<Value>) -> Self {
        Self::AttrEquals {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn attr_exists(key: &str) -> Self {
        Self::AttrExists {
            key: key.to_string(),
        }
    }

    pub fn attr_len(key: &str, len: usize) -> Self {
        Self::AttrLen {
            key: key.to_string(),
            len,
        }
    }

    pub fn id_unchanged(local: &str) -> Self {
        Self::IdUnchanged {
            local: local.to_string(),
        }
    }

    pub fn id_changed(local: &str) -> Self {
        Self::IdChanged {
            local: local.to_string(),
        }
    }

    pub fn custom<F>(name: &str, check: F) -> Self
    where
        F: Fn(&CheckInput<'_>) -> AssertResult + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.to_string(),
            check: Arc::new(check),
        }
    }

    /// Evaluate against one observation
    pub fn check(&self, input: &CheckInput<'_>) -> AssertResult {
        let current = input.current;
        match self {
            Self::AttrEquals { key, value } => match current.get(key) {
                Some(actual) if actual == value => Ok(()),
                Some(actual) => Err(AssertionFailure::new(format!(
                    "{}: expected {}, got {} (resource {})",
                    key,
                    value,
                    actual,
                    current.id()
                ))),
                None => Err(missing(key, current)),
            },
            Self::AttrExists { key } => current.get(key).map(|_| ()).ok_or_else(|| missing(key, current)),
            Self::AttrLen { key, len } => {
                let actual = current.get(key).ok_or_else(|| missing(key, current))?;
                match actual.len() {
                    Some(n) if n == *len => Ok(()),
                    Some(n) => Err(AssertionFailure::new(format!(
                        "{}: expected {} items, got {} (resource {})",
                        key,
                        len,
                        n,
                        current.id()
                    ))),
                    None => Err(AssertionFailure::new(format!(
                        "{}: expected a collection, got {}",
                        key,
                        actual.kind()
                    ))),
                }
            }
            Self::IdUnchanged { local } => {
                let bound = bound(input, local)?;
                if bound == current.id() {
                    Ok(())
                } else {
                    Err(AssertionFailure::new(format!(
                        "id: expected {} (bound to '{}'), got {}; resource was replaced",
                        bound,
                        local,
                        current.id()
                    )))
                }
            }
            Self::IdChanged { local } => {
                let bound = bound(input, local)?;
                if bound != current.id() {
                    Ok(())
                } else {
                    Err(AssertionFailure::new(format!(
                        "id: expected replacement of {} (bound to '{}'), but it is unchanged",
                        bound, local
                    )))
                }
            }
            Self::All(children) => children.iter().try_for_each(|child| child.check(input)),
            Self::Custom { check, .. } => check(input),
        }
    }
}

fn missing(key: &str, snapshot: &Snapshot) -> AssertionFailure {
    AssertionFailure::new(format!(
        "{}: attribute not set (resource {})",
        key,
        snapshot.id()
    ))
}

fn bound<'a>(input: &CheckInput<'a>, local: &str) -> std::result::Result<&'a Identifier, AssertionFailure> {
    input
        .locals
        .get(local)
        .ok_or_else(|| AssertionFailure::new(format!("no identifier bound to local '{}'", local)))
}
