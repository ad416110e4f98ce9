//! Contract Scenario - declarative scenario execution for smart contracts
//!
//! This library loads suites of deploy/call steps, drives them through a
//! chain capability and checks each outcome against its expectation.

pub mod chain;
pub mod cli;
pub mod commands;
pub mod common;
pub mod scenario;

// Re-export commonly used types for tests
pub use chain::mock::{MockCall, MockChain, MockContract, MockOutput};
pub use chain::{Address, Chain, ChainError};
pub use common::{Error, Result};
pub use scenario::{run_suite, RunOptions, ScenarioSuite, SuiteReport};
