//! YAML scenario runner
//!
//! Reads lifecycle scenarios from YAML files, renders their templates and
//! runs them through the acceptance harness, printing a per-step report.

mod config;
mod render;
mod runner;

pub use config::*;
pub use render::RenderContext;
pub use runner::{load_scenario, run_scenario, run_scenario_file, Output, TestResult};
