//! Runtime context shared by the steps of a suite run

use std::collections::BTreeMap;

use serde_json::Value;

use crate::chain::{Address, ContractHandle, Signer};
use crate::common::{Error, Result};

/// Named contract handles, named signers and deployment metadata
///
/// Built once by setup, appended to by deploy steps and handed to teardown.
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    pub contracts: BTreeMap<String, ContractHandle>,
    pub signers: BTreeMap<String, Signer>,
    /// Name of the signer used by steps without `from`
    pub default_signer: Option<String>,
    /// Free-form deployment metadata (network name, setup notes)
    pub metadata: BTreeMap<String, Value>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signer(&mut self, name: impl Into<String>, signer: Signer) {
        self.signers.insert(name.into(), signer);
    }

    pub fn set_default_signer(&mut self, name: &str) -> Result<()> {
        if !self.signers.contains_key(name) {
            return Err(Error::Configuration(format!(
                "default signer '{name}' is not declared"
            )));
        }
        self.default_signer = Some(name.to_string());
        Ok(())
    }

    pub fn insert_contract(&mut self, name: impl Into<String>, handle: ContractHandle) {
        self.contracts.insert(name.into(), handle);
    }

    /// Named signer, or a reference error
    pub fn signer(&self, name: &str) -> Result<&Signer> {
        self.signers
            .get(name)
            .ok_or_else(|| Error::unknown_signer(name))
    }

    /// Signer used when a step names none
    pub fn default_signer(&self) -> Result<&Signer> {
        let name = self.default_signer.as_deref().ok_or_else(|| {
            Error::Configuration("no default signer is available".to_string())
        })?;
        self.signer(name)
    }

    /// Named contract handle, or a reference error
    pub fn contract(&self, name: &str) -> Result<&ContractHandle> {
        self.contracts
            .get(name)
            .ok_or_else(|| Error::unknown_contract(name))
    }

    /// Contract deployed at `address`, if the context knows it
    pub fn contract_by_address(&self, address: &Address) -> Option<&ContractHandle> {
        self.contracts.values().find(|h| &h.address == address)
    }
}
