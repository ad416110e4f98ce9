//! scenario - declarative scenario runner for smart contracts
//!
//! Runs YAML suites of deploy/call steps against a JSON-RPC node and checks
//! return values, emitted events and revert reasons.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use contract_scenario::common::config::Config;
use contract_scenario::common::logging;
use contract_scenario::{cli, commands};

#[derive(Parser)]
#[command(name = "scenario", about = "Declarative scenario runner for smart contracts")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: ./scenario.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Verbose output (debug logs and per-step results)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.log_file {
        Some(path) => {
            logging::init_with_file(path, cli.verbose);
        }
        None => logging::init_cli(cli.verbose),
    }

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => cli::dispatch(cli.command, &config, cli.verbose).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
