//! Suite orchestration and lifecycle hooks
//!
//! A suite run builds one [`RuntimeContext`] through its setup hook, runs
//! the selected scenarios against it in order, and hands it to the teardown
//! hook exactly once. Setup and teardown errors end up on the report.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use super::config::{
    Action, AttachSpec, Expectation, Scenario, SetupSpec, Step, SuiteDefinition, SuiteMetadata,
};
use super::context::RuntimeContext;
use super::executor::execute;
use super::matcher::matches;
use super::report::{ScenarioResult, ScenarioStatus, SuiteReport};
use super::runner::{run_scenario, FailurePolicy};
use super::template::TemplateResolver;
use crate::chain::artifacts::ArtifactStore;
use crate::chain::{Chain, ContractHandle};
use crate::common::{Error, Result};

/// Produces the runtime context for a suite run
#[async_trait]
pub trait Setup: Send + Sync {
    async fn setup(&self, chain: &dyn Chain) -> Result<RuntimeContext>;
}

/// Cleans up after a suite run
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn teardown(&self, chain: &dyn Chain, context: &RuntimeContext) -> Result<()>;
}

/// A suite ready to run
pub struct ScenarioSuite {
    pub metadata: SuiteMetadata,
    pub scenarios: Vec<Scenario>,
    /// [`DefaultSetup`] when absent
    pub setup: Option<Box<dyn Setup>>,
    pub teardown: Option<Box<dyn Teardown>>,
}

impl ScenarioSuite {
    pub fn new(metadata: SuiteMetadata, scenarios: Vec<Scenario>) -> Self {
        Self {
            metadata,
            scenarios,
            setup: None,
            teardown: None,
        }
    }

    pub fn with_setup(mut self, setup: impl Setup + 'static) -> Self {
        self.setup = Some(Box::new(setup));
        self
    }

    pub fn with_teardown(mut self, teardown: impl Teardown + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Build a suite from a parsed file
    ///
    /// `store` backs `attach` entries of the setup block; `network` selects
    /// the deployment records.
    pub fn from_definition(
        definition: SuiteDefinition,
        store: Option<Arc<dyn ArtifactStore>>,
        network: impl Into<String>,
    ) -> Self {
        let mut suite = Self::new(definition.metadata, definition.scenarios);
        if let Some(spec) = definition.setup {
            suite.setup = Some(Box::new(DeclarativeSetup::new(spec, store, network)));
        }
        if let Some(spec) = definition.teardown {
            suite.teardown = Some(Box::new(DeclarativeTeardown::new(spec.steps)));
        }
        suite
    }
}

/// Options for [`run_suite`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub policy: FailurePolicy,
    /// Skip the remaining scenarios after the first failed one
    pub bail: bool,
    /// Only run scenarios whose name contains this text
    pub filter: Option<String>,
}

impl RunOptions {
    fn selects(&self, scenario: &Scenario) -> bool {
        self.filter
            .as_deref()
            .map_or(true, |f| scenario.name.contains(f))
    }
}

/// Run a suite
pub async fn run_suite(
    suite: &ScenarioSuite,
    chain: &dyn Chain,
    options: &RunOptions,
) -> SuiteReport {
    let started = Instant::now();
    let mut report = SuiteReport::new(&suite.metadata.name);
    let selected: Vec<&Scenario> = suite.scenarios.iter().filter(|s| options.selects(s)).collect();
    tracing::info!(suite = %suite.metadata.name, scenarios = selected.len(), "Running suite");

    let setup_result = match &suite.setup {
        Some(setup) => setup.setup(chain).await,
        None => DefaultSetup.setup(chain).await,
    };
    let mut context = match setup_result {
        Ok(context) => context,
        Err(e) => {
            tracing::warn!(suite = %suite.metadata.name, error = %e, "Setup failed");
            report.setup_error = Some(e.to_string());
            for scenario in selected {
                report.push(ScenarioResult::skipped(&scenario.name));
            }
            report.duration_ms = started.elapsed().as_millis() as u64;
            return report;
        }
    };

    let mut bailed = false;
    for scenario in selected {
        if bailed {
            report.push(ScenarioResult::skipped(&scenario.name));
            continue;
        }
        let result = run_scenario(scenario, &mut context, chain, options.policy).await;
        if result.status == ScenarioStatus::Failed && options.bail {
            bailed = true;
        }
        report.push(result);
    }

    let teardown_result = match &suite.teardown {
        Some(teardown) => teardown.teardown(chain, &context).await,
        None => Ok(()),
    };
    if let Err(e) = teardown_result {
        tracing::warn!(suite = %suite.metadata.name, error = %e, "Teardown failed");
        report.teardown_error = Some(e.to_string());
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        suite = %report.suite_name,
        passed = report.passed,
        failed = report.failed,
        skipped = report.skipped,
        "Suite finished"
    );
    report
}

/// Context with every chain signer registered as `signer0..signerN`
///
/// The first signer is the default.
pub struct DefaultSetup;

#[async_trait]
impl Setup for DefaultSetup {
    async fn setup(&self, chain: &dyn Chain) -> Result<RuntimeContext> {
        let mut context = RuntimeContext::new();
        for (index, signer) in chain.signers().await?.into_iter().enumerate() {
            context.add_signer(format!("signer{index}"), signer);
        }
        if context.signers.contains_key("signer0") {
            context.set_default_signer("signer0")?;
        }
        Ok(context)
    }
}

/// Setup described by a suite file's `setup` block
pub struct DeclarativeSetup {
    spec: SetupSpec,
    store: Option<Arc<dyn ArtifactStore>>,
    network: String,
}

impl DeclarativeSetup {
    pub fn new(
        spec: SetupSpec,
        store: Option<Arc<dyn ArtifactStore>>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            spec,
            store,
            network: network.into(),
        }
    }

    fn attach(&self, entry: &AttachSpec) -> Result<ContractHandle> {
        let store = self.store.as_ref().ok_or_else(|| {
            Error::Configuration(format!(
                "cannot attach '{}' without an artifact store",
                entry.name
            ))
        })?;
        let artifact = entry.artifact.as_deref().unwrap_or(&entry.name);

        let (address, abi) = match entry.address {
            Some(address) => (address, store.artifact(artifact)?.abi),
            None => {
                let record = store.deployment(artifact, &self.network)?;
                let abi = record.abi.ok_or_else(|| {
                    Error::Configuration(format!("no ABI available for '{artifact}'"))
                })?;
                (record.address, abi)
            }
        };
        tracing::debug!(contract = %entry.name, %address, "Attached deployment");
        Ok(ContractHandle::new(artifact, address, abi))
    }
}

#[async_trait]
impl Setup for DeclarativeSetup {
    async fn setup(&self, chain: &dyn Chain) -> Result<RuntimeContext> {
        let mut context = DefaultSetup.setup(chain).await?;
        let signer_count = context.signers.len();

        for (alias, &index) in &self.spec.signers {
            let signer = context
                .signers
                .get(&format!("signer{index}"))
                .cloned()
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "signer '{alias}' refers to index {index} but the chain has {} signer(s)",
                        signer_count
                    ))
                })?;
            context.add_signer(alias.clone(), signer);
        }
        if let Some(default) = &self.spec.default_signer {
            context.set_default_signer(default)?;
        }
        context
            .metadata
            .insert("network".to_string(), Value::String(self.network.clone()));

        for entry in &self.spec.attach {
            let handle = self.attach(entry)?;
            context.insert_contract(entry.name.clone(), handle);
        }

        for entry in &self.spec.deploy {
            let step = Step {
                name: format!("setup: deploy {}", entry.name),
                action: Action::Deploy {
                    contract: entry.name.clone(),
                    artifact: entry.artifact.clone(),
                    args: entry.args.clone(),
                },
                from: entry.from.clone(),
                value: entry.value.clone(),
                expect: None,
            };
            let execution = execute(&step, &mut context, chain).await?;
            if !execution.outcome.succeeded {
                return Err(Error::SetupFailed(format!(
                    "deploying '{}' failed: {}",
                    entry.name,
                    execution
                        .outcome
                        .revert_reason
                        .unwrap_or_else(|| "execution reverted".to_string())
                )));
            }
            tracing::info!(
                contract = %entry.name,
                address = %context.contract(&entry.name)?.address,
                "Deployed"
            );
        }

        Ok(context)
    }
}

/// Teardown described by a suite file's `teardown` block
///
/// Steps run in order against a copy of the context; every step runs even
/// when an earlier one failed.
pub struct DeclarativeTeardown {
    steps: Vec<Step>,
}

impl DeclarativeTeardown {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl Teardown for DeclarativeTeardown {
    async fn teardown(&self, chain: &dyn Chain, context: &RuntimeContext) -> Result<()> {
        let mut context = context.clone();
        let mut problems = Vec::new();

        for step in &self.steps {
            let name = step.display_name();
            let execution = match execute(step, &mut context, chain).await {
                Ok(execution) => execution,
                Err(e) => {
                    problems.push(format!("{name}: {e}"));
                    continue;
                }
            };
            let expectation = step.expect.clone().unwrap_or_else(Expectation::success);
            let resolver =
                TemplateResolver::new(&context).with_active_signer(execution.signer.address);
            let result = matches(&execution.outcome, &expectation, &resolver);
            if !result.ok {
                problems.push(format!("{name}: {}", result.failures.join("; ")));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::TeardownFailed(problems.join(", ")))
        }
    }
}
