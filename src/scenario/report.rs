//! Scenario and suite results
//!
//! Results are built bottom-up while a suite runs and are read-only
//! afterwards. A [`SuiteReport`] serializes to camelCase JSON.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::executor::StepOutcome;
use crate::chain::Address;
use crate::common::{Error, Result};

/// Classification of a step failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Configuration,
    Reference,
    TemplateResolution,
    /// The step did not succeed and declared no expectation
    ExecutionFailure,
    /// The outcome did not match the declared expectation
    ExpectationMismatch,
}

impl FailureKind {
    /// Kind of an error raised by the executor
    pub fn of(error: &Error) -> Self {
        match error {
            Error::Reference(_) => Self::Reference,
            Error::TemplateResolution { .. } => Self::TemplateResolution,
            _ => Self::Configuration,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "configuration error",
            Self::Reference => "reference error",
            Self::TemplateResolution => "template resolution error",
            Self::ExecutionFailure => "execution failure",
            Self::ExpectationMismatch => "expectation mismatch",
        };
        f.write_str(s)
    }
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    /// Zero-based index of the step within its scenario
    pub step_index: usize,
    pub step_name: String,
    pub kind: FailureKind,
    /// One entry per mismatch or a single error message
    pub messages: Vec<String>,
}

impl StepFailure {
    pub fn summary(&self) -> String {
        format!(
            "step {} '{}': {}: {}",
            self.step_index + 1,
            self.step_name,
            self.kind,
            self.messages.join("; ")
        )
    }
}

/// Result of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    pub action: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    /// Absent when the step failed before reaching the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub name: String,
    pub status: ScenarioStatus,
    pub steps: Vec<StepResult>,
    /// First failure; the one that aborted the scenario under the abort policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    pub duration_ms: u64,
}

impl ScenarioResult {
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ScenarioStatus::Skipped,
            steps: Vec::new(),
            failure: None,
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// Aggregated result of a suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub suite_name: String,
    pub total_scenarios: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
    pub duration_ms: u64,
    pub scenario_results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn new(suite_name: impl Into<String>) -> Self {
        Self {
            suite_name: suite_name.into(),
            total_scenarios: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            setup_error: None,
            teardown_error: None,
            duration_ms: 0,
            scenario_results: Vec::new(),
        }
    }

    /// Append a scenario result and update the counts
    pub fn push(&mut self, result: ScenarioResult) {
        self.total_scenarios += 1;
        match result.status {
            ScenarioStatus::Passed => self.passed += 1,
            ScenarioStatus::Failed => self.failed += 1,
            ScenarioStatus::Skipped => self.skipped += 1,
        }
        self.scenario_results.push(result);
    }

    /// No failed scenario and no lifecycle error
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.setup_error.is_none() && self.teardown_error.is_none()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the report as `<dir>/<file_stem>.json`
    pub fn write_json(&self, dir: &Path, file_stem: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", sanitize(file_stem)));
        std::fs::write(&path, self.to_json()?)?;
        tracing::debug!(path = %path.display(), "Report written");
        Ok(path)
    }

    /// Print a colored summary to stdout
    pub fn print_summary(&self, verbose: bool) {
        println!(
            "\n{} {}",
            "Suite:".blue().bold(),
            self.suite_name.white().bold()
        );

        if let Some(error) = &self.setup_error {
            println!("  {} setup failed: {}", "✗".red(), error);
        }

        for result in &self.scenario_results {
            match result.status {
                ScenarioStatus::Passed => {
                    println!(
                        "  {} {} {}",
                        "✓".green(),
                        result.name,
                        format!("({} ms)", result.duration_ms).dimmed()
                    );
                }
                ScenarioStatus::Skipped => {
                    println!("  {} {} {}", "-".yellow(), result.name, "(skipped)".dimmed());
                }
                ScenarioStatus::Failed => {
                    println!("  {} {}", "✗".red(), result.name.red());
                    if let Some(failure) = &result.failure {
                        println!("      {}", failure.summary());
                    }
                }
            }

            if verbose {
                for step in &result.steps {
                    let mark = if step.passed { "✓".green() } else { "✗".red() };
                    println!("      {} {} {}", mark, step.action.dimmed(), step.name);
                }
            }
        }

        if let Some(error) = &self.teardown_error {
            println!("  {} teardown failed: {}", "✗".red(), error);
        }

        let counts = format!(
            "{} passed, {} failed, {} skipped ({} ms)",
            self.passed, self.failed, self.skipped, self.duration_ms
        );
        if self.is_success() {
            println!("  {}", counts.green());
        } else {
            println!("  {}", counts.red());
        }
    }
}

/// Writes the reports of one run into a directory without letting suites
/// that share a name overwrite each other
///
/// A report is named after its suite. On a clash the suite file's stem is
/// tried next, then the suite name with a numeric suffix.
pub struct ReportWriter {
    dir: PathBuf,
    taken: HashSet<String>,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            taken: HashSet::new(),
        }
    }

    pub fn write(&mut self, report: &SuiteReport, source: &Path) -> Result<PathBuf> {
        let stem = self.free_stem(&report.suite_name, source);
        let path = report.write_json(&self.dir, &stem)?;
        self.taken.insert(stem);
        Ok(path)
    }

    fn free_stem(&self, suite_name: &str, source: &Path) -> String {
        let by_name = sanitize(suite_name);
        if !self.taken.contains(&by_name) {
            return by_name;
        }
        if let Some(file_stem) = source.file_stem().and_then(|s| s.to_str()) {
            let by_file = sanitize(file_stem);
            if !self.taken.contains(&by_file) {
                return by_file;
            }
        }
        let mut n = 2;
        loop {
            let candidate = format!("{by_name}-{n}");
            if !self.taken.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// File-system friendly version of a suite name
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "suite".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(name: &str, status: ScenarioStatus) -> ScenarioResult {
        ScenarioResult {
            name: name.to_string(),
            status,
            steps: Vec::new(),
            failure: None,
            duration_ms: 3,
        }
    }

    #[test]
    fn test_counts() {
        let mut report = SuiteReport::new("demo");
        report.push(scenario("a", ScenarioStatus::Passed));
        report.push(scenario("b", ScenarioStatus::Failed));
        report.push(ScenarioResult::skipped("c"));

        assert_eq!(report.total_scenarios, 3);
        assert_eq!((report.passed, report.failed, report.skipped), (1, 1, 1));
        assert!(!report.is_success());
    }

    #[test]
    fn test_json_field_names() {
        let mut report = SuiteReport::new("demo");
        report.setup_error = Some("no signers".into());
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["suiteName"], "demo");
        assert_eq!(json["totalScenarios"], 0);
        assert_eq!(json["setupError"], "no signers");
        assert!(json.get("teardownError").is_none());
        assert!(json["scenarioResults"].is_array());
    }

    #[test]
    fn test_failure_summary() {
        let failure = StepFailure {
            step_index: 1,
            step_name: "reset".into(),
            kind: FailureKind::ExecutionFailure,
            messages: vec!["Only owner can reset".into()],
        };
        assert_eq!(
            failure.summary(),
            "step 2 'reset': execution failure: Only owner can reset"
        );
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = SuiteReport::new("Simple Storage");
        let path = report.write_json(dir.path(), &report.suite_name).unwrap();
        assert!(path.ends_with("Simple_Storage.json"));
        let loaded = SuiteReport::from_json(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_report_writer_keeps_same_named_suites_apart() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ReportWriter::new(dir.path());
        let report = SuiteReport::new("Storage");

        let first = writer.write(&report, Path::new("suites/storage.yaml")).unwrap();
        let second = writer.write(&report, Path::new("suites/storage_v2.yaml")).unwrap();
        let third = writer.write(&report, Path::new("other/storage_v2.yaml")).unwrap();

        assert!(first.ends_with("Storage.json"));
        assert!(second.ends_with("storage_v2.json"));
        assert!(third.ends_with("Storage-2.json"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
