//! End-to-end tests for the scenario engine
//!
//! These tests load the YAML suites under `tests/fixtures`, run them against
//! an in-memory chain with Rust implementations of the fixture contracts,
//! and drive the `scenario` binary for the commands that need no node.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use contract_scenario::chain::abi::Abi;
use contract_scenario::scenario::loader;
use contract_scenario::scenario::{
    FailureKind, RuntimeContext, Scenario, ScenarioStatus, Step, SuiteMetadata, Teardown,
};
use contract_scenario::{
    run_suite, Address, Chain, MockCall, MockChain, MockContract, MockOutput, RunOptions,
    ScenarioSuite, SuiteReport,
};
use serde_json::{json, Value};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn fixture(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

// === Fixture contracts ===

fn storage_abi() -> Abi {
    Abi::from_json(json!([
        {"type": "constructor", "inputs": [{"name": "initialValue", "type": "uint256"}]},
        {"type": "function", "name": "getValue", "inputs": [], "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view"},
        {"type": "function", "name": "setValue", "inputs": [{"name": "newValue", "type": "uint256"}], "outputs": [], "stateMutability": "nonpayable"},
        {"type": "function", "name": "increment", "inputs": [], "outputs": [], "stateMutability": "nonpayable"},
        {"type": "function", "name": "reset", "inputs": [], "outputs": [], "stateMutability": "nonpayable"},
        {"type": "event", "name": "ValueChanged", "inputs": [
            {"name": "oldValue", "type": "uint256", "indexed": false},
            {"name": "newValue", "type": "uint256", "indexed": false},
            {"name": "changedBy", "type": "address", "indexed": true}
        ]}
    ]))
    .unwrap()
}

fn emitter_abi() -> Abi {
    Abi::from_json(json!([
        {"type": "function", "name": "emitBoth", "inputs": [], "outputs": [], "stateMutability": "nonpayable"},
        {"type": "event", "name": "First", "inputs": [{"name": "count", "type": "uint256", "indexed": false}]},
        {"type": "event", "name": "Second", "inputs": [{"name": "who", "type": "address", "indexed": true}]}
    ]))
    .unwrap()
}

fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

struct Storage {
    value: u64,
    owner: Address,
}

impl MockContract for Storage {
    fn invoke(&mut self, call: &MockCall<'_>) -> Result<MockOutput, String> {
        let changed = |old: u64, new: u64| {
            MockOutput::default().emit(
                "ValueChanged",
                vec![
                    json!(old.to_string()),
                    json!(new.to_string()),
                    json!(call.from.to_string()),
                ],
            )
        };
        match call.function {
            "getValue" => Ok(MockOutput::returning(json!(self.value.to_string()))),
            "setValue" => {
                let new = as_u64(&call.args[0]).ok_or("invalid value")?;
                let old = std::mem::replace(&mut self.value, new);
                Ok(changed(old, new))
            }
            "increment" => {
                self.value += 1;
                Ok(changed(self.value - 1, self.value))
            }
            "reset" if call.from != self.owner => Err("Only owner can reset".to_string()),
            "reset" => {
                let old = std::mem::take(&mut self.value);
                Ok(changed(old, 0))
            }
            other => Err(format!("unknown function {other}")),
        }
    }
}

struct Emitter {
    count: u64,
}

impl MockContract for Emitter {
    fn invoke(&mut self, call: &MockCall<'_>) -> Result<MockOutput, String> {
        self.count += 1;
        Ok(MockOutput::default()
            .emit("First", vec![json!(self.count)])
            .emit("Second", vec![json!(call.from.to_string())]))
    }
}

fn fixture_chain() -> MockChain {
    let mut chain = MockChain::new(3);
    chain.register("SimpleStorage", storage_abi(), |args, deployer| {
        let value = args.first().and_then(as_u64).unwrap_or_default();
        Ok(Box::new(Storage {
            value,
            owner: deployer,
        }) as Box<dyn MockContract>)
    });
    chain.register("Emitter", emitter_abi(), |_, _| {
        Ok(Box::new(Emitter { count: 0 }) as Box<dyn MockContract>)
    });
    chain
}

async fn run_fixture(name: &str, chain: &MockChain, options: &RunOptions) -> SuiteReport {
    let definition = loader::load_suite(&fixture(name)).unwrap();
    let suite = ScenarioSuite::from_definition(definition, None, "localhost");
    run_suite(&suite, chain, options).await
}

// === Engine tests ===

#[tokio::test]
async fn test_simple_storage_suite() {
    let chain = fixture_chain();
    let report = run_fixture("simple_storage.yaml", &chain, &RunOptions::default()).await;

    assert_eq!(report.suite_name, "SimpleStorage");
    assert!(report.setup_error.is_none());
    assert!(report.teardown_error.is_none(), "{:?}", report.teardown_error);
    assert_eq!(report.total_scenarios, 4);
    assert_eq!((report.passed, report.failed, report.skipped), (3, 1, 0));

    let results = &report.scenario_results;
    assert_eq!(results[0].status, ScenarioStatus::Passed, "{:?}", results[0].failure);
    assert_eq!(results[0].steps.len(), 5);

    let set_value = results[0].steps[1].outcome.as_ref().unwrap();
    let event = &set_value.emitted_events[0];
    assert_eq!(event.args["oldValue"], json!("42"));
    assert_eq!(event.args["newValue"], json!("100"));
    assert_eq!(
        Some(event.args["changedBy"].as_str().unwrap().parse::<Address>().unwrap()),
        results[0].steps[1].signer
    );

    assert_eq!(results[1].status, ScenarioStatus::Passed);

    // Unchecked revert aborts the scenario with an execution failure
    let unchecked = &results[2];
    assert_eq!(unchecked.status, ScenarioStatus::Failed);
    assert_eq!(unchecked.steps.len(), 1);
    let failure = unchecked.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::ExecutionFailure);
    assert_eq!(failure.messages, vec!["Only owner can reset".to_string()]);
    assert_eq!(
        unchecked.steps[0].outcome.as_ref().unwrap().revert_reason.as_deref(),
        Some("Only owner can reset")
    );

    // Rejected resets left the value alone
    assert_eq!(results[3].status, ScenarioStatus::Passed);

    // Teardown reset ran once, as owner
    let resets: Vec<_> = chain
        .invocations()
        .into_iter()
        .filter(|i| i.target == "reset")
        .collect();
    assert_eq!(resets.len(), 3);
    assert!(!resets[2].reverted);
    assert_eq!(chain.invocation_count("increment"), 1);
}

#[tokio::test]
async fn test_event_order_is_enforced() {
    let chain = fixture_chain();
    let report = run_fixture("event_order.yaml", &chain, &RunOptions::default()).await;

    let statuses: Vec<_> = report.scenario_results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ScenarioStatus::Passed,
            ScenarioStatus::Failed,
            ScenarioStatus::Passed,
            ScenarioStatus::Passed,
        ]
    );

    let failure = report.scenario_results[1].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::ExpectationMismatch);
    assert_eq!(failure.messages.len(), 2);

    // Zero-step scenario
    assert!(report.scenario_results[3].steps.is_empty());
}

#[tokio::test]
async fn test_bail_skips_after_first_failure() {
    let chain = fixture_chain();
    let options = RunOptions {
        bail: true,
        ..Default::default()
    };
    let report = run_fixture("event_order.yaml", &chain, &options).await;
    assert_eq!((report.passed, report.failed, report.skipped), (1, 1, 2));
    assert_eq!(chain.invocation_count("emitBoth"), 2);
}

#[tokio::test]
async fn test_report_json_round_trip() {
    let chain = fixture_chain();
    let report = run_fixture("simple_storage.yaml", &chain, &RunOptions::default()).await;

    let dir = tempfile::tempdir().unwrap();
    let path = report.write_json(dir.path(), &report.suite_name).unwrap();
    let loaded = SuiteReport::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(loaded, report);
    let names: Vec<_> = loaded.scenario_results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "owner updates value",
            "non-owner reset is rejected",
            "unchecked non-owner reset",
            "value unchanged after rejected resets",
        ]
    );
    assert_eq!((loaded.passed, loaded.failed), (3, 1));
}

struct CountingTeardown(Arc<AtomicUsize>);

#[async_trait]
impl Teardown for CountingTeardown {
    async fn teardown(
        &self,
        _chain: &dyn Chain,
        context: &RuntimeContext,
    ) -> contract_scenario::Result<()> {
        assert!(context.contracts.contains_key("storage"));
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_teardown_once_when_all_scenarios_fail() {
    let chain = fixture_chain();
    let calls = Arc::new(AtomicUsize::new(0));
    let failing = |name: &str| {
        Scenario::new(name).step(
            Step::call("storage", "reset")
                .from("signer1")
                .expect(Default::default()),
        )
    };
    let suite = ScenarioSuite::new(
        SuiteMetadata::named("all failing"),
        vec![
            Scenario::new("deploy")
                .step(Step::deploy("storage", "SimpleStorage").args(vec![json!(1)])),
            failing("first"),
            failing("second"),
        ],
    )
    .with_teardown(CountingTeardown(calls.clone()));

    let report = run_suite(&suite, &chain, &RunOptions::default()).await;
    assert_eq!((report.passed, report.failed), (1, 2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_setup_deploy_failure_is_reported() {
    // Signers but no registered artifacts
    let chain = MockChain::new(2);
    let report = run_fixture("simple_storage.yaml", &chain, &RunOptions::default()).await;
    let error = report.setup_error.unwrap();
    assert!(error.contains("storage"), "{error}");
    assert_eq!(report.skipped, 4);
}

// === Static checks ===

#[test]
fn test_fixtures_pass_static_check() {
    for name in ["simple_storage.yaml", "event_order.yaml"] {
        let suite = loader::load_suite(&fixture(name)).unwrap();
        assert!(loader::check(&suite).is_empty(), "{name}");
    }
}

#[test]
fn test_broken_fixture_reports_every_problem() {
    let suite = loader::load_suite(&fixture("broken_references.yaml")).unwrap();
    let issues = loader::check(&suite);
    assert_eq!(issues.len(), 3, "{issues:#?}");
}

// === CLI ===

fn scenario_bin() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_scenario"))
}

#[test]
fn test_cli_list_filters_by_tag() {
    let output = Command::new(scenario_bin())
        .args(["list", "--tag", "events"])
        .arg(fixtures_dir())
        .output()
        .expect("Failed to run scenario list");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("EventOrder"));
    assert!(stdout.contains("swapped order"));
    assert!(!stdout.contains("SimpleStorage"));
}

#[test]
fn test_cli_check_exit_status() {
    let ok = Command::new(scenario_bin())
        .arg("check")
        .arg(fixture("simple_storage.yaml"))
        .output()
        .expect("Failed to run scenario check");
    assert!(ok.status.success());

    let broken = Command::new(scenario_bin())
        .arg("check")
        .arg(fixture("broken_references.yaml"))
        .output()
        .expect("Failed to run scenario check");
    assert!(!broken.status.success());
    let stdout = String::from_utf8_lossy(&broken.stdout);
    assert!(stdout.contains("signer 'mallory' is not declared"));
    assert!(String::from_utf8_lossy(&broken.stderr).contains("3 problem(s) found"));
}

#[test]
fn test_cli_run_reports_unreachable_node_as_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(scenario_bin())
        .current_dir(dir.path())
        .args(["run", "--json", "--rpc-url", "http://127.0.0.1:1"])
        .arg(fixture("event_order.yaml"))
        .output()
        .expect("Failed to run scenario run");

    assert!(!output.status.success());
    let reports: Vec<SuiteReport> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].setup_error.is_some());
    assert_eq!(reports[0].skipped, 4);
}
