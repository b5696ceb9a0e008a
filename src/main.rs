//! acctest - lifecycle acceptance tests for declarative infrastructure
//!
//! Runs YAML scenarios (apply, import, reapply, destroy) against a simulated
//! cloud and reports per-step results.

use acctest::{cli, commands, common::logging};
use clap::Parser;
use commands::Commands;

#[derive(Parser)]
#[command(name = "acctest", about = "Acceptance-test harness for infrastructure providers")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_cli(cli.command.verbose());

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
