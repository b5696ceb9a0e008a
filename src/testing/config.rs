//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;

use crate::acc::Value;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Environment variables that must be set for the scenario to run
    #[serde(default)]
    pub precheck: Vec<String>,
    /// Template variables, rendered in order; later ones may use earlier ones
    #[serde(default)]
    pub vars: serde_yaml::Mapping,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Apply a configuration template
    Apply {
        /// Configuration text; `{{var}}` placeholders are rendered first
        config: String,
        /// Resource address to observe (required when the config has several)
        target: Option<String>,
        /// Locals to bind the observed identifier to
        #[serde(default)]
        bind: Vec<String>,
        /// Whether this apply is expected to replace the resource
        #[serde(default)]
        expect_replacement: bool,
        /// Checks against the observed resource
        #[serde(default)]
        expect: Vec<Expectation>,
    },
    /// Import a previously created resource and verify the round trip
    Import {
        /// Resource address to import
        address: String,
        /// Attributes excluded from the round-trip comparison
        #[serde(default)]
        verify_ignore: Vec<String>,
        #[serde(default)]
        bind: Vec<String>,
        #[serde(default)]
        expect: Vec<Expectation>,
    },
    /// Destroy all tracked resources
    Destroy,
}

/// A single check on the observed resource
#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Attribute equals a literal (strings are rendered)
    AttrEquals { key: String, value: Value },
    /// Attribute is set
    AttrExists(String),
    /// Collection attribute has exactly `len` items
    AttrLen { key: String, len: usize },
    /// Identifier equals the one bound to this local
    IdUnchanged(String),
    /// Identifier differs from the one bound to this local
    IdChanged(String),
}
