//! Read-only artifact and deployment lookup
//!
//! Compiler artifacts hold a contract's ABI and creation bytecode; deployment
//! records hold where a contract already lives on a given network. Layout on
//! disk follows the common Hardhat conventions:
//!
//! - `<artifacts_dir>/**/<Name>.json` with `{contractName, abi, bytecode}`
//! - `<deployments_dir>/<network>/<Name>.json` with `{address, abi?}`

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::abi::Abi;
use super::{Address, ChainError, ChainResult};

/// A compiled contract
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub contract_name: String,
    pub abi: Abi,
    #[serde(default)]
    pub bytecode: Bytecode,
}

/// Creation bytecode, either a plain hex string or Foundry's `{object: ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Bytecode {
    Hex(String),
    Object { object: String },
}

impl Default for Bytecode {
    fn default() -> Self {
        Self::Hex(String::new())
    }
}

impl Bytecode {
    pub fn to_bytes(&self) -> ChainResult<Vec<u8>> {
        let hex_str = match self {
            Self::Hex(s) => s,
            Self::Object { object } => object,
        };
        hex::decode(hex_str.trim().trim_start_matches("0x"))
            .map_err(|e| ChainError::Abi(format!("invalid bytecode: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Hex(s) | Self::Object { object: s } => s.trim_start_matches("0x").is_empty(),
        }
    }
}

/// An existing deployment on some network
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentRecord {
    pub address: Address,
    #[serde(default)]
    pub abi: Option<Abi>,
}

/// Lookup of artifacts and deployments; never written to by the engine
pub trait ArtifactStore: Send + Sync {
    fn artifact(&self, name: &str) -> ChainResult<Artifact>;

    fn deployment(&self, name: &str, network: &str) -> ChainResult<DeploymentRecord>;
}

/// Artifact store backed by directories on disk
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    artifacts_dir: PathBuf,
    deployments_dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(artifacts_dir: impl Into<PathBuf>, deployments_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            deployments_dir: deployments_dir.into(),
        }
    }

    /// Find `<name>.json` anywhere below the artifacts directory
    fn find_artifact_file(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{name}.json");
        let mut pending = vec![self.artifacts_dir.clone()];

        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut subdirs = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    subdirs.push(path);
                } else if path.file_name().and_then(|f| f.to_str()) == Some(file_name.as_str()) {
                    return Some(path);
                }
            }
            // Deterministic search order
            subdirs.sort();
            subdirs.reverse();
            pending.extend(subdirs);
        }
        None
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ChainResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| ChainError::InvalidArtifact {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ChainError::InvalidArtifact {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

impl ArtifactStore for FsArtifactStore {
    fn artifact(&self, name: &str) -> ChainResult<Artifact> {
        let path = self
            .find_artifact_file(name)
            .ok_or_else(|| ChainError::ArtifactNotFound(name.to_string()))?;
        tracing::debug!(artifact = name, path = %path.display(), "Loading artifact");

        let mut artifact: Artifact = read_json(&path)?;
        if artifact.contract_name.is_empty() {
            artifact.contract_name = name.to_string();
        }
        Ok(artifact)
    }

    fn deployment(&self, name: &str, network: &str) -> ChainResult<DeploymentRecord> {
        let path = self.deployments_dir.join(network).join(format!("{name}.json"));
        if !path.exists() {
            return Err(ChainError::DeploymentNotFound {
                name: name.to_string(),
                network: network.to_string(),
            });
        }
        tracing::debug!(contract = name, network, path = %path.display(), "Loading deployment");

        let mut record: DeploymentRecord = read_json(&path)?;
        if record.abi.is_none() {
            // Fall back to the compiler artifact for the interface
            record.abi = self.artifact(name).ok().map(|a| a.abi);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ARTIFACT: &str = r#"{
        "contractName": "SimpleStorage",
        "abi": [{"type": "function", "name": "getValue", "inputs": [], "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view"}],
        "bytecode": "0x6080"
    }"#;

    #[test]
    fn test_artifact_found_in_nested_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("artifacts/contracts/SimpleStorage.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("SimpleStorage.json"), ARTIFACT).unwrap();

        let store = FsArtifactStore::new(
            dir.path().join("artifacts"),
            dir.path().join("deployments"),
        );
        let artifact = store.artifact("SimpleStorage").unwrap();
        assert_eq!(artifact.contract_name, "SimpleStorage");
        assert_eq!(artifact.bytecode.to_bytes().unwrap(), vec![0x60, 0x80]);
        assert!(artifact.abi.function("getValue", 0).is_some());
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path(), dir.path());
        assert!(matches!(
            store.artifact("Nope"),
            Err(ChainError::ArtifactNotFound(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_deployment_falls_back_to_artifact_abi() {
        let dir = tempdir().unwrap();
        let artifacts = dir.path().join("artifacts");
        let deployments = dir.path().join("deployments/localhost");
        std::fs::create_dir_all(&artifacts).unwrap();
        std::fs::create_dir_all(&deployments).unwrap();
        std::fs::write(artifacts.join("SimpleStorage.json"), ARTIFACT).unwrap();
        std::fs::write(
            deployments.join("SimpleStorage.json"),
            r#"{"address": "0x5FbDB2315678afecb367f032d93F642f64180aa3"}"#,
        )
        .unwrap();

        let store = FsArtifactStore::new(&artifacts, dir.path().join("deployments"));
        let record = store.deployment("SimpleStorage", "localhost").unwrap();
        assert_eq!(
            record.address.to_string(),
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
        assert!(record.abi.is_some());

        assert!(matches!(
            store.deployment("SimpleStorage", "mainnet"),
            Err(ChainError::DeploymentNotFound { .. })
        ));
    }

    #[test]
    fn test_foundry_bytecode_object() {
        let artifact: Artifact =
            serde_json::from_str(r#"{"abi": [], "bytecode": {"object": "0x00ff"}}"#).unwrap();
        assert_eq!(artifact.bytecode.to_bytes().unwrap(), vec![0x00, 0xff]);
        assert!(!artifact.bytecode.is_empty());
    }
}
