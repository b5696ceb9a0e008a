//! Error types for the acceptance-test harness
//!
//! The variants split into four classes that the scenario runner treats
//! differently: transport failures from collaborators, expected absence
//! (`NotFound`), test failures (`Assertion`, `StillExists`) and caller bugs
//! (`Harness`). Everything else is ambient (config and file loading).

use std::io;
use thiserror::Error;

use crate::acc::Identifier;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Collaborator Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Resource {id} not found")]
    NotFound { id: Identifier },

    // === Test Failures ===
    #[error("Step {step}: {message}")]
    Assertion { step: usize, message: String },

    #[error("Resource {id} still exists after destroy")]
    StillExists { id: Identifier },

    // === Harness Errors ===
    #[error("Invalid scenario: {0}")]
    Harness(String),

    #[error("Scenario cancelled")]
    Cancelled,

    #[error("Template error: {0}")]
    Template(String),

    #[error("{failed} of {total} scenarios failed")]
    ScenariosFailed { failed: usize, total: usize },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario file '{path}': {message}")]
    ScenarioParse { path: String, message: String },

    #[error("Invalid resource configuration: {0}")]
    ResourceConfig(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error for an identifier
    pub fn not_found(id: &Identifier) -> Self {
        Self::NotFound { id: id.clone() }
    }

    /// Create a transport error from anything displayable
    pub fn transport<S: std::fmt::Display>(message: S) -> Self {
        Self::Transport(message.to_string())
    }

    /// Create an assertion failure at the given step index
    pub fn assertion(step: usize, message: impl Into<String>) -> Self {
        Self::Assertion {
            step,
            message: message.into(),
        }
    }

    /// Whether this is the expected "remote entity is gone" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this failure is a test verdict rather than a harness or
    /// collaborator problem
    pub fn is_test_failure(&self) -> bool {
        matches!(self, Self::Assertion { .. } | Self::StillExists { .. })
    }

    /// Step index this error is attributed to, when known
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::Assertion { step, .. } => Some(*step),
            _ => None,
        }
    }
}
