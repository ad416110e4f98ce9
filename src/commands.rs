//! CLI command definitions
//!
//! Defines the clap commands for the scenario CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run suite files against a JSON-RPC node
    Run {
        /// Suite files or directories (scanned recursively for *.yaml / *.yml)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Network name (selects the RPC URL and deployment records)
        #[arg(long, short)]
        network: Option<String>,

        /// JSON-RPC endpoint, overriding the configured one
        #[arg(long)]
        rpc_url: Option<String>,

        /// Directory holding compiled artifacts
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Directory holding deployment records
        #[arg(long)]
        deployments: Option<PathBuf>,

        /// Only run scenarios whose name contains this text
        #[arg(long, short)]
        scenario: Option<String>,

        /// Only run suites carrying this tag (can be given several times)
        #[arg(long, short)]
        tag: Vec<String>,

        /// Skip the remaining scenarios of a suite after its first failure
        #[arg(long)]
        bail: bool,

        /// Keep executing a scenario's steps after a failed step
        #[arg(long)]
        continue_on_failure: bool,

        /// Write one JSON report per suite into this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Print reports as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List suites and their scenarios
    List {
        /// Suite files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only list suites carrying this tag
        #[arg(long, short)]
        tag: Vec<String>,
    },

    /// Check suites for reference and template problems without running them
    Check {
        /// Suite files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}
