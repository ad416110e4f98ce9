//! In-memory chain capability
//!
//! `MockChain` runs contracts written in Rust against real ABIs: arguments
//! and return values go through the ABI codec and emitted events are encoded
//! into raw logs, so code driven by a `MockChain` sees exactly what it would
//! see from a node. Every invocation is recorded for later assertions.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use primitive_types::U256;
use serde_json::Value;

use super::abi::{Abi, Function};
use super::{
    Address, CallOptions, Chain, ChainError, ChainResult, ContractHandle, Deployment, Receipt,
    Signer,
};

/// First address handed out to deployed contracts
const CONTRACT_ADDRESS_BASE: u64 = 0xc0_0000;
/// First signer address
const SIGNER_ADDRESS_BASE: u64 = 0x5_0000;

/// What a contract sees when it is invoked
#[derive(Debug, Clone)]
pub struct MockCall<'a> {
    pub function: &'a str,
    pub args: &'a [Value],
    pub from: Address,
    pub value: U256,
    /// Address of the contract being invoked
    pub this: Address,
}

/// Result of a successful invocation
#[derive(Debug, Clone, Default)]
pub struct MockOutput {
    pub value: Value,
    pub events: Vec<(String, Vec<Value>)>,
}

impl MockOutput {
    pub fn returning(value: Value) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    pub fn emit(mut self, event: impl Into<String>, args: Vec<Value>) -> Self {
        self.events.push((event.into(), args));
        self
    }
}

/// Behaviour of a mock contract
///
/// Returning `Err(reason)` reverts the invocation. Implementations must check
/// their preconditions before mutating state, since there is no rollback.
pub trait MockContract: Send {
    fn invoke(&mut self, call: &MockCall<'_>) -> Result<MockOutput, String>;
}

type Factory =
    Box<dyn Fn(&[Value], Address) -> Result<Box<dyn MockContract>, String> + Send + Sync>;

struct RegisteredArtifact {
    abi: Abi,
    factory: Factory,
}

/// How an invocation reached the mock chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Deploy,
    Call,
    Send,
}

/// A recorded invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub kind: InvocationKind,
    /// Artifact name for deploys, function name otherwise
    pub target: String,
    pub from: Address,
    pub reverted: bool,
}

#[derive(Default)]
struct MockState {
    deployed: u64,
    block_number: u64,
    contracts: HashMap<Address, Box<dyn MockContract>>,
    invocations: Vec<Invocation>,
}

/// Deterministic in-memory implementation of [`Chain`]
pub struct MockChain {
    signers: Vec<Signer>,
    artifacts: HashMap<String, RegisteredArtifact>,
    transport_failures: HashSet<String>,
    receipt_reverts: HashSet<String>,
    state: Mutex<MockState>,
}

impl MockChain {
    /// Create a chain with `signer_count` funded accounts
    pub fn new(signer_count: usize) -> Self {
        let signers = (0..signer_count as u64)
            .map(|i| Signer::new(Address::from_low_u64(SIGNER_ADDRESS_BASE + i)))
            .collect();
        Self {
            signers,
            artifacts: HashMap::new(),
            transport_failures: HashSet::new(),
            receipt_reverts: HashSet::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Register a deployable artifact
    pub fn register<F>(&mut self, name: impl Into<String>, abi: Abi, factory: F)
    where
        F: Fn(&[Value], Address) -> Result<Box<dyn MockContract>, String> + Send + Sync + 'static,
    {
        self.artifacts.insert(
            name.into(),
            RegisteredArtifact {
                abi,
                factory: Box::new(factory),
            },
        );
    }

    /// Make every invocation of `target` (function or artifact name) fail
    /// with a transport error instead of reaching the contract
    pub fn fail_with_transport_error(&mut self, target: impl Into<String>) {
        self.transport_failures.insert(target.into());
    }

    /// Make transactions to function `target` get included with status 0
    /// without reaching the contract, as a node does for out-of-gas or
    /// reverts it cannot report at submission time
    pub fn revert_in_receipt(&mut self, target: impl Into<String>) {
        self.receipt_reverts.insert(target.into());
    }

    pub fn signer(&self, index: usize) -> Option<&Signer> {
        self.signers.get(index)
    }

    /// All invocations so far, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state
            .lock()
            .map(|s| s.invocations.clone())
            .unwrap_or_default()
    }

    /// Number of invocations of `target` (function or artifact name)
    pub fn invocation_count(&self, target: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|i| i.target == target)
            .count()
    }

    fn lock(&self) -> ChainResult<std::sync::MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| ChainError::Transport("mock chain state poisoned".to_string()))
    }

    fn check_transport(&self, target: &str) -> ChainResult<()> {
        if self.transport_failures.contains(target) {
            return Err(ChainError::Transport(format!(
                "connection refused while invoking '{target}'"
            )));
        }
        Ok(())
    }

    fn invoke(
        &self,
        kind: InvocationKind,
        contract: &ContractHandle,
        function: &Function,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<MockOutput> {
        self.check_transport(&function.name)?;
        // Arguments must be encodable exactly as a node would require
        function.encode_call(args)?;

        let mut state = self.lock()?;
        let instance = state.contracts.get_mut(&contract.address).ok_or_else(|| {
            ChainError::Transport(format!("no contract deployed at {}", contract.address))
        })?;
        let result = instance.invoke(&MockCall {
            function: &function.name,
            args,
            from: options.from,
            value: options.value.unwrap_or_default(),
            this: contract.address,
        });

        state.invocations.push(Invocation {
            kind,
            target: function.name.clone(),
            from: options.from,
            reverted: result.is_err(),
        });
        result.map_err(ChainError::revert)
    }
}

#[async_trait]
impl Chain for MockChain {
    async fn signers(&self) -> ChainResult<Vec<Signer>> {
        Ok(self.signers.clone())
    }

    async fn deploy(
        &self,
        artifact: &str,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Deployment> {
        self.check_transport(artifact)?;
        let registered = self
            .artifacts
            .get(artifact)
            .ok_or_else(|| ChainError::ArtifactNotFound(artifact.to_string()))?;
        if let Some(constructor) = registered.abi.constructor() {
            constructor.encode_args(args)?;
        }

        let mut state = self.lock()?;
        let result = (registered.factory)(args, options.from);
        state.invocations.push(Invocation {
            kind: InvocationKind::Deploy,
            target: artifact.to_string(),
            from: options.from,
            reverted: result.is_err(),
        });
        let instance = result.map_err(ChainError::revert)?;

        state.deployed += 1;
        state.block_number += 1;
        let address = Address::from_low_u64(CONTRACT_ADDRESS_BASE + state.deployed);
        state.contracts.insert(address, instance);

        let receipt = Receipt {
            transaction_hash: format!("0x{:064x}", state.invocations.len()),
            status: Some(1),
            block_number: Some(state.block_number),
            contract_address: Some(address),
            logs: Vec::new(),
        };

        Ok(Deployment {
            handle: ContractHandle::new(artifact, address, registered.abi.clone()),
            receipt: Some(receipt),
        })
    }

    async fn call(
        &self,
        contract: &ContractHandle,
        function: &Function,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Value> {
        let output = self.invoke(InvocationKind::Call, contract, function, args, options)?;
        // Round-trip through the codec so values look like node output
        function.decode_output(&function.encode_output(&output.value)?)
    }

    async fn send(
        &self,
        contract: &ContractHandle,
        function: &Function,
        args: &[Value],
        options: &CallOptions,
    ) -> ChainResult<Receipt> {
        if self.receipt_reverts.contains(&function.name) {
            self.check_transport(&function.name)?;
            function.encode_call(args)?;
            let mut state = self.lock()?;
            state.invocations.push(Invocation {
                kind: InvocationKind::Send,
                target: function.name.clone(),
                from: options.from,
                reverted: true,
            });
            state.block_number += 1;
            return Ok(Receipt {
                transaction_hash: format!("0x{:064x}", state.invocations.len()),
                status: Some(0),
                block_number: Some(state.block_number),
                contract_address: None,
                logs: Vec::new(),
            });
        }

        let output = self.invoke(InvocationKind::Send, contract, function, args, options)?;

        let mut logs = Vec::with_capacity(output.events.len());
        for (name, event_args) in &output.events {
            let event = contract.abi.event(name).ok_or_else(|| {
                ChainError::Abi(format!("event '{name}' is not declared in the ABI"))
            })?;
            logs.push(event.encode_log(contract.address, event_args)?);
        }

        let mut state = self.lock()?;
        state.block_number += 1;
        Ok(Receipt {
            transaction_hash: format!("0x{:064x}", state.invocations.len()),
            status: Some(1),
            block_number: Some(state.block_number),
            contract_address: None,
            logs,
        })
    }
}
