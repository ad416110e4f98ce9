//! Scenario runner
//!
//! Executes the steps of one scenario in order and matches each outcome
//! against its expectation as soon as the step completes.

use std::time::Instant;

use serde::Deserialize;

use super::config::{Scenario, Step};
use super::context::RuntimeContext;
use super::executor::{execute, StepExecution};
use super::matcher::matches;
use super::report::{FailureKind, ScenarioResult, ScenarioStatus, StepFailure, StepResult};
use super::template::TemplateResolver;
use crate::chain::Chain;

/// What happens to the remaining steps after a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the scenario at the first failed step
    #[default]
    Abort,
    /// Keep executing; errors raised before chain interaction still abort
    Continue,
}

/// Run one scenario
pub async fn run_scenario(
    scenario: &Scenario,
    context: &mut RuntimeContext,
    chain: &dyn Chain,
    policy: FailurePolicy,
) -> ScenarioResult {
    let started = Instant::now();
    tracing::info!(scenario = %scenario.name, steps = scenario.steps.len(), "Running scenario");

    let mut steps = Vec::with_capacity(scenario.steps.len());
    let mut first_failure: Option<StepFailure> = None;

    for (index, step) in scenario.steps.iter().enumerate() {
        let (result, abort) = run_step(index, step, context, chain).await;
        if let Some(failure) = &result.failure {
            tracing::info!(scenario = %scenario.name, "{}", failure.summary());
            first_failure.get_or_insert_with(|| failure.clone());
        }
        steps.push(result);

        if first_failure.is_some() && (abort || policy == FailurePolicy::Abort) {
            break;
        }
    }

    let status = if first_failure.is_some() {
        ScenarioStatus::Failed
    } else {
        ScenarioStatus::Passed
    };
    ScenarioResult {
        name: scenario.name.clone(),
        status,
        steps,
        failure: first_failure,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Execute and check one step
///
/// The flag is set when the failure must abort regardless of policy.
pub(crate) async fn run_step(
    index: usize,
    step: &Step,
    context: &mut RuntimeContext,
    chain: &dyn Chain,
) -> (StepResult, bool) {
    let started = Instant::now();
    let name = step.display_name();
    let failure = |kind, messages| StepFailure {
        step_index: index,
        step_name: name.clone(),
        kind,
        messages,
    };

    let (signer, outcome, failure) = match execute(step, context, chain).await {
        Err(e) => {
            let failure = failure(FailureKind::of(&e), vec![e.to_string()]);
            let result = StepResult {
                name: name.clone(),
                action: step.action.kind().to_string(),
                passed: false,
                signer: None,
                outcome: None,
                failure: Some(failure),
                duration_ms: started.elapsed().as_millis() as u64,
            };
            return (result, true);
        }
        Ok(StepExecution { outcome, signer }) => {
            let failure = match &step.expect {
                Some(expectation) => {
                    let resolver =
                        TemplateResolver::new(context).with_active_signer(signer.address);
                    let result = matches(&outcome, expectation, &resolver);
                    (!result.ok).then(|| failure(FailureKind::ExpectationMismatch, result.failures))
                }
                None if !outcome.succeeded => Some(failure(
                    FailureKind::ExecutionFailure,
                    vec![outcome
                        .revert_reason
                        .clone()
                        .unwrap_or_else(|| "execution reverted".to_string())],
                )),
                None => None,
            };
            (signer, outcome, failure)
        }
    };

    let result = StepResult {
        name,
        action: step.action.kind().to_string(),
        passed: failure.is_none(),
        signer: Some(signer.address),
        outcome: Some(outcome),
        failure,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    (result, false)
}
