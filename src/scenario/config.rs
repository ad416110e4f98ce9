//! Suite file data model
//!
//! Defines the data structures for deserializing YAML suite files.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::Address;

/// A complete suite as written in a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct SuiteDefinition {
    pub metadata: SuiteMetadata,
    /// Declarative setup; the default setup is used when absent
    pub setup: Option<SetupSpec>,
    pub teardown: Option<TeardownSpec>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// Descriptive information about a suite
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SuiteMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl SuiteMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Declarative setup: signers, attached deployments and fresh deploys
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SetupSpec {
    /// Signer alias -> index into the chain's signer list
    #[serde(default)]
    pub signers: BTreeMap<String, usize>,
    pub default_signer: Option<String>,
    /// Existing deployments to attach to
    #[serde(default)]
    pub attach: Vec<AttachSpec>,
    /// Contracts to deploy, in order
    #[serde(default)]
    pub deploy: Vec<DeploySpec>,
}

/// A contract deployed by setup
#[derive(Deserialize, Debug, Clone)]
pub struct DeploySpec {
    /// Name the handle is registered under
    pub name: String,
    /// Artifact to deploy (defaults to `name`)
    pub artifact: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
    pub from: Option<String>,
    pub value: Option<Value>,
}

/// An existing deployment attached by setup
#[derive(Deserialize, Debug, Clone)]
pub struct AttachSpec {
    pub name: String,
    /// Artifact providing the ABI (defaults to `name`)
    pub artifact: Option<String>,
    /// Explicit address; looked up in the deployment store when absent
    pub address: Option<Address>,
}

/// Declarative teardown: call steps run after all scenarios
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TeardownSpec {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// An ordered group of steps exercising one behavioural path
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Scenario {
    /// Informational; not required to be unique
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// One contract interaction plus its expected outcome
#[derive(Deserialize, Debug, Clone)]
pub struct Step {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub action: Action,
    /// Signer name; the context's default signer when absent
    pub from: Option<String>,
    /// Native currency attached to the call, decimal or hex wei, or an
    /// amount with a unit (`"1.5 ether"`)
    pub value: Option<Value>,
    pub expect: Option<Expectation>,
}

/// What a step does
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Deploy an artifact and register the handle under `contract`
    Deploy {
        contract: String,
        /// Artifact to deploy (defaults to `contract`)
        artifact: Option<String>,
        /// Constructor arguments
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Invoke a function on a named contract
    Call {
        contract: String,
        function: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

impl Action {
    /// Lowercase action name as written in suite files
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Deploy { .. } => "deploy",
            Action::Call { .. } => "call",
        }
    }

    pub fn contract(&self) -> &str {
        match self {
            Action::Deploy { contract, .. } | Action::Call { contract, .. } => contract,
        }
    }

    pub fn args(&self) -> &[Value] {
        match self {
            Action::Deploy { args, .. } | Action::Call { args, .. } => args,
        }
    }
}

impl Step {
    /// A call step with no arguments
    pub fn call(contract: impl Into<String>, function: impl Into<String>) -> Self {
        Self::with_action(Action::Call {
            contract: contract.into(),
            function: function.into(),
            args: Vec::new(),
        })
    }

    /// A deploy step registering the new handle as `contract`
    pub fn deploy(contract: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self::with_action(Action::Deploy {
            contract: contract.into(),
            artifact: Some(artifact.into()),
            args: Vec::new(),
        })
    }

    fn with_action(action: Action) -> Self {
        Self {
            name: String::new(),
            action,
            from: None,
            value: None,
            expect: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn args(mut self, values: Vec<Value>) -> Self {
        match &mut self.action {
            Action::Deploy { args, .. } | Action::Call { args, .. } => *args = values,
        }
        self
    }

    pub fn from(mut self, signer: impl Into<String>) -> Self {
        self.from = Some(signer.into());
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expect = Some(expectation);
        self
    }

    /// Name shown in reports: the declared name, or a description of the action
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match &self.action {
            Action::Deploy { contract, .. } => format!("deploy {contract}"),
            Action::Call {
                contract, function, ..
            } => format!("{contract}.{function}"),
        }
    }
}

/// Declared outcome of a step
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    #[serde(default = "default_success")]
    pub success: bool,
    /// Expected result; scalars are compared after normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ReturnType>,
    /// Expected revert message; only checked when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventExpectation>>,
}

fn default_success() -> bool {
    true
}

impl Default for Expectation {
    fn default() -> Self {
        Self {
            success: true,
            return_value: None,
            return_type: None,
            revert_reason: None,
            events: None,
        }
    }
}

impl Expectation {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn revert(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            revert_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn returning(value: Value) -> Self {
        Self {
            return_value: Some(value),
            ..Self::default()
        }
    }

    pub fn with_events(mut self, events: Vec<EventExpectation>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Type tag for shallow validation of a return value
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    #[serde(alias = "uint256")]
    Uint,
    #[serde(alias = "int256")]
    Int,
    Bool,
    Address,
    Bytes,
    String,
}

impl std::fmt::Display for ReturnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReturnType::Uint => "uint",
            ReturnType::Int => "int",
            ReturnType::Bool => "bool",
            ReturnType::Address => "address",
            ReturnType::Bytes => "bytes",
            ReturnType::String => "string",
        };
        f.write_str(s)
    }
}

/// An expected event: a bare name, or a name with expected arguments
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum EventExpectation {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        args: BTreeMap<String, Value>,
    },
}

impl EventExpectation {
    pub fn name(&self) -> &str {
        match self {
            EventExpectation::Name(name) | EventExpectation::Detailed { name, .. } => name,
        }
    }

    pub fn with_args<K: Into<String>>(
        name: impl Into<String>,
        args: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        EventExpectation::Detailed {
            name: name.into(),
            args: args.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
