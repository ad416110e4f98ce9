//! Step executor
//!
//! Runs one deploy or call step against the chain and turns whatever the
//! chain reports into a [`StepOutcome`]. Chain failures are never errors
//! here: they become unsuccessful outcomes. Errors are reserved for problems
//! found before the chain is touched (unknown signer, contract, function,
//! malformed value, unresolved template).

use std::collections::BTreeMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{Action, Step};
use super::context::RuntimeContext;
use super::template::TemplateResolver;
use crate::chain::abi::{decode_revert, parse_uint_str, Function};
use crate::chain::{
    Address, CallOptions, Chain, ChainError, ContractHandle, RawLog, Receipt, Signer,
};
use crate::common::{Error, Result};

/// Observed result of executing a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub succeeded: bool,
    /// Return value of a read-only call, or the address of a deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    #[serde(default)]
    pub emitted_events: Vec<EmittedEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl StepOutcome {
    fn failed(reason: String) -> Self {
        Self {
            succeeded: false,
            revert_reason: Some(reason),
            ..Default::default()
        }
    }

    fn with_receipt(mut self, receipt: &Receipt) -> Self {
        self.transaction_hash = Some(receipt.transaction_hash.clone());
        self.status = receipt.status;
        self.block_number = receipt.block_number;
        self
    }
}

/// A decoded event, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub name: String,
    /// Address of the emitting contract
    pub address: Address,
    pub args: BTreeMap<String, Value>,
}

/// Outcome of a step together with the signer that ran it
#[derive(Debug, Clone)]
pub struct StepExecution {
    pub outcome: StepOutcome,
    pub signer: Signer,
}

/// Execute one step
///
/// Deploy steps register the new handle in `context` under the step's
/// contract name.
pub async fn execute(
    step: &Step,
    context: &mut RuntimeContext,
    chain: &dyn Chain,
) -> Result<StepExecution> {
    let signer = resolve_signer(step.from.as_deref(), context)?;
    let value = step.value.as_ref().map(parse_value).transpose()?;
    let args = TemplateResolver::new(context)
        .with_active_signer(signer.address)
        .resolve_args(step.action.args())?;
    let options = CallOptions::sender(&signer).with_value(value);

    tracing::debug!(
        step = %step.display_name(),
        action = step.action.kind(),
        from = %signer.address,
        "Executing step"
    );

    let outcome = match &step.action {
        Action::Deploy {
            contract, artifact, ..
        } => {
            let artifact = artifact.as_deref().unwrap_or(contract);
            deploy(contract, artifact, &args, &options, context, chain).await
        }
        Action::Call {
            contract, function, ..
        } => {
            let handle = context.contract(contract)?.clone();
            let function = find_function(&handle, contract, function, args.len())?.clone();
            call(&handle, &function, &args, &options, context, chain).await
        }
    };

    if !outcome.succeeded {
        tracing::debug!(
            step = %step.display_name(),
            reason = outcome.revert_reason.as_deref().unwrap_or_default(),
            "Step did not succeed"
        );
    }

    Ok(StepExecution { outcome, signer })
}

async fn deploy(
    name: &str,
    artifact: &str,
    args: &[Value],
    options: &CallOptions,
    context: &mut RuntimeContext,
    chain: &dyn Chain,
) -> StepOutcome {
    let deployment = match chain.deploy(artifact, args, options).await {
        Ok(deployment) => deployment,
        Err(e) => return StepOutcome::failed(revert_reason(&e, None)),
    };

    let address = deployment.handle.address;
    context.insert_contract(name, deployment.handle);

    let mut outcome = StepOutcome {
        succeeded: true,
        return_value: Some(Value::String(address.to_string())),
        ..Default::default()
    };
    if let Some(receipt) = &deployment.receipt {
        outcome.emitted_events = decode_logs(&receipt.logs, context);
        outcome = outcome.with_receipt(receipt);
    }
    outcome
}

async fn call(
    handle: &ContractHandle,
    function: &Function,
    args: &[Value],
    options: &CallOptions,
    context: &RuntimeContext,
    chain: &dyn Chain,
) -> StepOutcome {
    if function.is_read_only() {
        return match chain.call(handle, function, args, options).await {
            Ok(value) => StepOutcome {
                succeeded: true,
                return_value: Some(value),
                ..Default::default()
            },
            Err(e) => StepOutcome::failed(revert_reason(&e, Some(handle))),
        };
    }

    match chain.send(handle, function, args, options).await {
        Ok(receipt) if receipt.reverted() => {
            StepOutcome::failed("execution reverted".to_string()).with_receipt(&receipt)
        }
        Ok(receipt) => StepOutcome {
            succeeded: true,
            emitted_events: decode_logs(&receipt.logs, context),
            ..Default::default()
        }
        .with_receipt(&receipt),
        Err(e) => StepOutcome::failed(revert_reason(&e, Some(handle))),
    }
}

fn resolve_signer(from: Option<&str>, context: &RuntimeContext) -> Result<Signer> {
    match from {
        Some(name) => context.signer(name).cloned(),
        None => context.default_signer().cloned(),
    }
}

/// Function matching both name and argument count
fn find_function<'h>(
    handle: &'h ContractHandle,
    contract: &str,
    name: &str,
    arg_count: usize,
) -> Result<&'h Function> {
    handle
        .abi
        .functions()
        .find(|f| f.name == name && f.inputs.len() == arg_count)
        .ok_or_else(|| Error::unknown_function(contract, name, arg_count))
}

/// Parse a step's native-currency amount into wei
///
/// Accepts JSON integers, decimal or `0x` hex strings, and amounts with a
/// unit suffix (`wei`, `gwei`, `ether`), which may carry a fraction.
pub fn parse_value(value: &Value) -> Result<U256> {
    let malformed = || Error::Configuration(format!("malformed value '{value}'"));
    match value {
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(malformed),
        Value::String(s) => {
            let s = s.trim();
            let (amount, decimals) = match s.split_once(char::is_whitespace) {
                Some((amount, unit)) => {
                    let decimals = match unit.trim().to_ascii_lowercase().as_str() {
                        "wei" => 0,
                        "gwei" => 9,
                        "ether" | "eth" => 18,
                        _ => return Err(malformed()),
                    };
                    (amount, decimals)
                }
                None => return parse_uint_str(s).map_err(|_| malformed()),
            };
            scale(amount, decimals).ok_or_else(malformed)
        }
        _ => Err(malformed()),
    }
}

/// `amount * 10^decimals`, where `amount` may have a fractional part
fn scale(amount: &str, decimals: usize) -> Option<U256> {
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    if fraction.len() > decimals
        || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
        || (whole.is_empty() && fraction.is_empty())
    {
        return None;
    }
    let digits = format!("{whole}{fraction:0<decimals$}");
    U256::from_dec_str(if digits.is_empty() { "0" } else { &digits }).ok()
}

/// Decode logs emitted by contracts the context knows about
///
/// Logs from unknown addresses or with unknown topics are skipped.
fn decode_logs(logs: &[RawLog], context: &RuntimeContext) -> Vec<EmittedEvent> {
    logs.iter()
        .filter_map(|log| {
            let handle = context.contract_by_address(&log.address)?;
            match handle.abi.decode_log(log)? {
                Ok(decoded) => Some(EmittedEvent {
                    name: decoded.name,
                    address: log.address,
                    args: decoded.args.into_iter().collect(),
                }),
                Err(e) => {
                    tracing::warn!(address = %log.address, error = %e, "Skipping undecodable log");
                    None
                }
            }
        })
        .collect()
}

/// Human-readable failure message for a chain error
///
/// Order: explicit reason, decodable revert data (including custom errors
/// of the target contract), then a generic description.
fn revert_reason(error: &ChainError, handle: Option<&ContractHandle>) -> String {
    match error {
        ChainError::Reverted {
            reason: Some(reason),
            ..
        } => reason.clone(),
        ChainError::Reverted {
            data: Some(data), ..
        } => decode_revert(data)
            .or_else(|| handle.and_then(|h| h.abi.decode_error(data)))
            .unwrap_or_else(|| "execution reverted".to_string()),
        ChainError::Reverted { .. } => "execution reverted".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::fixtures::storage_chain;
    use crate::chain::mock::MockChain;
    use serde_json::json;

    async fn deployed(chain: &MockChain) -> RuntimeContext {
        let mut ctx = RuntimeContext::new();
        for (i, name) in ["owner", "alice"].into_iter().enumerate() {
            ctx.add_signer(name, chain.signer(i).unwrap().clone());
        }
        ctx.set_default_signer("owner").unwrap();

        let step = Step::deploy("storage", "SimpleStorage").args(vec![json!(42)]);
        let exec = execute(&step, &mut ctx, chain).await.unwrap();
        assert!(exec.outcome.succeeded);
        ctx
    }

    #[tokio::test]
    async fn test_deploy_registers_handle() {
        let chain = storage_chain();
        let ctx = deployed(&chain).await;
        let handle = ctx.contract("storage").unwrap();
        assert_eq!(handle.artifact, "SimpleStorage");
    }

    #[tokio::test]
    async fn test_view_call_captures_return_value() {
        let chain = storage_chain();
        let mut ctx = deployed(&chain).await;
        let exec = execute(&Step::call("storage", "getValue"), &mut ctx, &chain)
            .await
            .unwrap();
        assert!(exec.outcome.succeeded);
        assert_eq!(exec.outcome.return_value, Some(json!("42")));
        assert!(exec.outcome.transaction_hash.is_none());
        assert_eq!(exec.signer, *ctx.signer("owner").unwrap());
    }

    #[tokio::test]
    async fn test_transaction_decodes_events() {
        let chain = storage_chain();
        let mut ctx = deployed(&chain).await;
        let step = Step::call("storage", "setValue")
            .args(vec![json!(100)])
            .from("alice");
        let exec = execute(&step, &mut ctx, &chain).await.unwrap();

        let outcome = exec.outcome;
        assert!(outcome.succeeded);
        assert!(outcome.transaction_hash.is_some());
        assert_eq!(outcome.status, Some(1));
        assert_eq!(outcome.emitted_events.len(), 1);
        let event = &outcome.emitted_events[0];
        assert_eq!(event.name, "ValueChanged");
        assert_eq!(event.args["oldValue"], json!("42"));
        assert_eq!(event.args["newValue"], json!("100"));
        assert_eq!(
            event.args["changedBy"],
            json!(ctx.signer("alice").unwrap().address.to_string())
        );
    }

    #[tokio::test]
    async fn test_revert_becomes_unsuccessful_outcome() {
        let chain = storage_chain();
        let mut ctx = deployed(&chain).await;
        let step = Step::call("storage", "reset").from("alice");
        let exec = execute(&step, &mut ctx, &chain).await.unwrap();
        assert!(!exec.outcome.succeeded);
        assert_eq!(
            exec.outcome.revert_reason.as_deref(),
            Some("Only owner can reset")
        );
    }

    #[tokio::test]
    async fn test_status_zero_receipt_is_a_revert() {
        let mut chain = storage_chain();
        chain.revert_in_receipt("setValue");
        let mut ctx = deployed(&chain).await;
        let step = Step::call("storage", "setValue").args(vec![json!(5)]);
        let outcome = execute(&step, &mut ctx, &chain).await.unwrap().outcome;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.revert_reason.as_deref(), Some("execution reverted"));
        assert_eq!(outcome.status, Some(0));
        assert!(outcome.transaction_hash.is_some());
        assert!(outcome.block_number.is_some());
        assert!(outcome.emitted_events.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_text_is_kept() {
        let mut chain = storage_chain();
        chain.fail_with_transport_error("increment");
        let mut ctx = deployed(&chain).await;
        let exec = execute(&Step::call("storage", "increment"), &mut ctx, &chain)
            .await
            .unwrap();
        assert!(!exec.outcome.succeeded);
        assert!(exec
            .outcome
            .revert_reason
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_reference_errors_before_chain_interaction() {
        let chain = storage_chain();
        let mut ctx = deployed(&chain).await;
        let before = chain.invocations().len();

        let unknown_contract = Step::call("token", "getValue");
        assert!(matches!(
            execute(&unknown_contract, &mut ctx, &chain).await,
            Err(Error::Reference(_))
        ));

        let wrong_arity = Step::call("storage", "setValue");
        assert!(matches!(
            execute(&wrong_arity, &mut ctx, &chain).await,
            Err(Error::Reference(_))
        ));

        let unknown_signer = Step::call("storage", "getValue").from("mallory");
        assert!(matches!(
            execute(&unknown_signer, &mut ctx, &chain).await,
            Err(Error::Reference(_))
        ));

        let bad_value = Step::call("storage", "increment").value(json!("lots"));
        assert!(matches!(
            execute(&bad_value, &mut ctx, &chain).await,
            Err(Error::Configuration(_))
        ));

        let bad_template = Step::call("storage", "setValue").args(vec![json!("{{nobody}}")]);
        assert!(matches!(
            execute(&bad_template, &mut ctx, &chain).await,
            Err(Error::TemplateResolution { .. })
        ));

        assert_eq!(chain.invocations().len(), before);
    }

    #[tokio::test]
    async fn test_missing_default_signer() {
        let chain = storage_chain();
        let mut ctx = RuntimeContext::new();
        let step = Step::deploy("storage", "SimpleStorage");
        assert!(matches!(
            execute(&step, &mut ctx, &chain).await,
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(&json!(5)).unwrap(), U256::from(5));
        assert_eq!(parse_value(&json!("0x10")).unwrap(), U256::from(16));
        assert_eq!(
            parse_value(&json!("1.5 ether")).unwrap(),
            U256::from(1_500_000_000_000_000_000u64)
        );
        assert_eq!(parse_value(&json!("2 gwei")).unwrap(), U256::from(2_000_000_000u64));
        assert!(parse_value(&json!("-1")).is_err());
        assert!(parse_value(&json!("1 parsec")).is_err());
        assert!(parse_value(&json!("0.0000000001 gwei")).is_err());
        assert!(parse_value(&json!(true)).is_err());
    }

    #[test]
    fn test_revert_reason_order() {
        assert_eq!(revert_reason(&ChainError::revert("nope"), None), "nope");
        let bare = ChainError::Reverted {
            reason: None,
            data: None,
        };
        assert_eq!(revert_reason(&bare, None), "execution reverted");
        let panic = ChainError::Reverted {
            reason: None,
            data: Some(hex::decode(format!("4e487b71{:064x}", 0x11)).unwrap()),
        };
        assert!(revert_reason(&panic, None).contains("0x11"));
        assert_eq!(
            revert_reason(&ChainError::Transport("timed out".into()), None),
            "Transport error: timed out"
        );
    }
}
