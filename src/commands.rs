//! CLI command definitions
//!
//! Defines the clap commands for the acctest CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Execute test scenarios defined in YAML files
    Run {
        /// Paths to YAML scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,

        /// Configuration file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override how many reads a deleted group stays visible
        #[arg(long)]
        read_lag: Option<u32>,

        /// Run scenarios one after another
        #[arg(long)]
        sequential: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and render scenario files without running them
    Check {
        /// Paths to YAML scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Commands {
    /// Whether debug logging was requested
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Run { verbose: true, .. })
    }
}
