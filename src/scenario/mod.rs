//! Declarative scenario engine
//!
//! Suites are loaded from YAML ([`loader`]), turned into a [`ScenarioSuite`]
//! and run against a [`Chain`](crate::chain::Chain) by [`run_suite`]. Each
//! scenario runs its steps through the [`executor`] and checks them with the
//! [`matcher`].

pub mod config;
pub mod context;
pub mod executor;
pub mod loader;
pub mod matcher;
pub mod report;
pub mod runner;
pub mod suite;
pub mod template;

pub use config::{
    Action, EventExpectation, Expectation, ReturnType, Scenario, Step, SuiteDefinition,
    SuiteMetadata,
};
pub use context::RuntimeContext;
pub use executor::{execute, EmittedEvent, StepExecution, StepOutcome};
pub use matcher::{matches, MatchResult};
pub use report::{
    FailureKind, ReportWriter, ScenarioResult, ScenarioStatus, StepFailure, StepResult,
    SuiteReport,
};
pub use runner::{run_scenario, FailurePolicy};
pub use suite::{run_suite, RunOptions, ScenarioSuite, Setup, Teardown};
pub use template::{TemplateResolver, TemplateToken};
