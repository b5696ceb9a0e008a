//! Acceptance-test harness for declarative infrastructure providers
//!
//! Drives multi-step lifecycle scenarios (apply, import, reapply, destroy)
//! against a provisioning engine, checks the observed remote state after
//! every step and confirms that everything created is gone afterwards.

pub mod acc;
pub mod cli;
pub mod commands;
pub mod common;
pub mod sim;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
