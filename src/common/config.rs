//! Configuration file handling

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::{config_path, LOCAL_CONFIG_FILE};
use super::{Error, Result};
use crate::scenario::runner::FailurePolicy;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Named networks
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,

    /// Artifact and deployment locations
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run behaviour
    #[serde(default)]
    pub run: RunConfig,
}

/// Default settings
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Network used when `--network` is not given
    #[serde(default = "default_network")]
    pub network: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            network: default_network(),
        }
    }
}

fn default_network() -> String {
    "localhost".to_string()
}

/// Connection settings for one network
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
}

/// Artifact and deployment directories
#[derive(Debug, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            deployments_dir: default_deployments_dir(),
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}
fn default_deployments_dir() -> PathBuf {
    PathBuf::from("deployments")
}

/// Timeout settings
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Timeout for a single JSON-RPC request
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// How long to wait for a transaction to be included
    #[serde(default = "default_receipt")]
    pub receipt_secs: u64,

    /// Delay between receipt polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request(),
            receipt_secs: default_receipt(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Timeouts {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn receipt(&self) -> Duration {
        Duration::from_secs(self.receipt_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_request() -> u64 {
    30
}
fn default_receipt() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    250
}

/// Run behaviour
#[derive(Debug, Deserialize, Default)]
pub struct RunConfig {
    /// What to do with the remaining steps after a step fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Skip the remaining scenarios after the first failed one
    #[serde(default)]
    pub bail: bool,
}

impl Config {
    /// Load configuration
    ///
    /// Lookup order: `explicit` path (must exist), `./scenario.toml`, the
    /// platform config file. Returns the default configuration when none
    /// exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load_file(&local);
        }

        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// RPC endpoint for a network
    ///
    /// `localhost` resolves to the conventional development node address when
    /// not configured explicitly.
    pub fn rpc_url(&self, network: &str) -> Option<String> {
        if let Some(config) = self.networks.get(network) {
            return Some(config.rpc_url.clone());
        }
        (network == "localhost").then(|| "http://127.0.0.1:8545".to_string())
    }
}
