//! Chain capability
//!
//! The engine never talks to a node directly. Everything it needs from "the
//! chain" goes through the [`Chain`] trait: listing signers, deploying an
//! artifact, calling a read-only function and sending a transaction. The
//! JSON-RPC implementation lives in [`rpc`], an in-memory one for tests in
//! [`mock`].

pub mod abi;
pub mod artifacts;
pub mod mock;
pub mod rpc;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use self::abi::{Abi, Function};

/// Result type for chain operations
pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Errors surfaced by a chain capability
#[derive(Error, Debug)]
pub enum ChainError {
    /// The call or transaction reverted on chain
    #[error("execution reverted{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Reverted {
        /// Human-readable reason, when the node reported one
        reason: Option<String>,
        /// Raw revert data, when the node returned it
        data: Option<Vec<u8>>,
    },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Artifact '{0}' not found")]
    ArtifactNotFound(String),

    #[error("Invalid artifact file '{path}': {message}")]
    InvalidArtifact { path: String, message: String },

    #[error("Deployment of '{name}' not found for network '{network}'")]
    DeploymentNotFound { name: String, network: String },

    #[error("Transaction {hash} not included after {secs} seconds")]
    ReceiptTimeout { hash: String, secs: u64 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl ChainError {
    /// Create a revert error carrying only a reason string
    pub fn revert(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: Some(reason.into()),
            data: None,
        }
    }
}

/// A 20-byte account or contract address
///
/// Displayed and serialized as lowercase `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Build an address whose last eight bytes hold `n` (used for deterministic fakes)
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> ChainResult<Self> {
        let stripped = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        if stripped.len() != 40 {
            return Err(ChainError::InvalidAddress(s.to_string()));
        }
        let raw = hex::decode(stripped).map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An account able to send transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub address: Address,
}

impl Signer {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

/// A deployed contract: where it lives and how to talk to it
#[derive(Debug, Clone)]
pub struct ContractHandle {
    /// Artifact (contract type) name
    pub artifact: String,
    pub address: Address,
    pub abi: Arc<Abi>,
}

impl ContractHandle {
    pub fn new(artifact: impl Into<String>, address: Address, abi: Abi) -> Self {
        Self {
            artifact: artifact.into(),
            address,
            abi: Arc::new(abi),
        }
    }
}

/// Sender and attached value for a call, deploy or transaction
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub from: Address,
    pub value: Option<U256>,
}

impl CallOptions {
    pub fn sender(signer: &Signer) -> Self {
        Self {
            from: signer.address,
            value: None,
        }
    }

    pub fn with_value(mut self, value: Option<U256>) -> Self {
        self.value = value;
        self
    }
}

/// A log entry as found in a transaction receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// Receipt of an included transaction
#[derive(Debug, Clone, Default)]
pub struct Receipt {
    pub transaction_hash: String,
    /// 1 on success, 0 on revert (absent on pre-byzantium nodes)
    pub status: Option<u64>,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
    pub logs: Vec<RawLog>,
}

impl Receipt {
    pub fn reverted(&self) -> bool {
        self.status == Some(0)
    }
}

/// Result of a successful deployment
#[derive(Debug, Clone)]
pub struct Deployment {
    pub handle: ContractHandle,
    pub receipt: Option<Receipt>,
}

/// The capability the engine drives contracts through
///
/// Implementations own nonce management, gas estimation and retries; the
/// engine awaits each operation before issuing the next.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Accounts available for signing, in the node's order
    async fn signers(&self) -> ChainResult<Vec<Signer>>;

    /// Deploy the named artifact with constructor arguments
    async fn deploy(
        &self,
        artifact: &str,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Deployment>;

    /// Invoke a read-only function without a transaction
    async fn call(
        &self,
        contract: &ContractHandle,
        function: &Function,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Value>;

    /// Send a state-mutating transaction and wait for its inclusion
    async fn send(
        &self,
        contract: &ContractHandle,
        function: &Function,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Receipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d".parse().unwrap();
        assert_eq!(addr.to_string(), "0x742d35cc6634c0532925a3b844bc9e7595f0ab3d");
    }

    #[test]
    fn test_address_rejects_bad_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("not an address at all, definitely not hex!".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_from_low_u64() {
        assert_eq!(
            Address::from_low_u64(1).to_string(),
            "0x0000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn test_revert_error_message() {
        assert_eq!(
            ChainError::revert("Only owner can reset").to_string(),
            "execution reverted: Only owner can reset"
        );
        let bare = ChainError::Reverted {
            reason: None,
            data: None,
        };
        assert_eq!(bare.to_string(), "execution reverted");
    }
}
