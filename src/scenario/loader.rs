//! Suite source: YAML files and directories of them

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::config::{Action, EventExpectation, Step, SuiteDefinition};
use super::executor::parse_value;
use super::template::TemplateToken;
use crate::common::{Error, Result};

/// Parse a suite from YAML text; `path` is only used in error messages
pub fn parse_suite(content: &str, path: &Path) -> Result<SuiteDefinition> {
    serde_yaml::from_str(content).map_err(|e| Error::SuiteLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load one suite file
pub fn load_suite(path: &Path) -> Result<SuiteDefinition> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
    let suite = parse_suite(&content, path)?;
    tracing::debug!(path = %path.display(), suite = %suite.metadata.name, "Loaded suite");
    Ok(suite)
}

/// Expand files and directories into a sorted list of suite files
///
/// Directories are scanned recursively for `*.yaml` and `*.yml`.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut in_dir = Vec::new();
            collect_yaml(path, &mut in_dir)?;
            in_dir.sort();
            found.extend(in_dir);
        } else if path.exists() {
            found.push(path.clone());
        } else {
            return Err(Error::file_read(path, "no such file or directory"));
        }
    }
    Ok(found)
}

fn collect_yaml(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

/// Discover and load every suite under `paths`
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<(PathBuf, SuiteDefinition)>> {
    discover(paths)?
        .into_iter()
        .map(|path| load_suite(&path).map(|suite| (path, suite)))
        .collect()
}

/// A problem found by [`check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIssue {
    /// Where the problem is, e.g. `scenario 'x', step 2 'storage.getValue'`
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Names a suite can refer to at some point of its execution
struct Declared {
    contracts: BTreeSet<String>,
    signers: BTreeSet<String>,
}

impl Declared {
    /// Aliases, plus `signer<N>` which every setup registers
    fn knows_signer(&self, name: &str) -> bool {
        self.signers.contains(name)
            || name
                .strip_prefix("signer")
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// Statically check a suite without touching a chain
///
/// Verifies that contract references are declared by setup or an earlier
/// deploy step, that signer references are declared, that template tokens
/// refer to known names and that values parse.
pub fn check(suite: &SuiteDefinition) -> Vec<CheckIssue> {
    let mut issues = Vec::new();
    let mut declared = Declared {
        contracts: BTreeSet::new(),
        signers: BTreeSet::new(),
    };

    if let Some(setup) = &suite.setup {
        declared.signers.extend(setup.signers.keys().cloned());
        if let Some(default) = &setup.default_signer {
            if !declared.knows_signer(default) {
                issues.push(CheckIssue {
                    location: "setup".to_string(),
                    message: format!("default signer '{default}' is not declared"),
                });
            }
        }
        declared
            .contracts
            .extend(setup.attach.iter().map(|a| a.name.clone()));
        for deploy in &setup.deploy {
            let location = format!("setup deploy '{}'", deploy.name);
            check_signer(deploy.from.as_deref(), &declared, &location, &mut issues);
            check_value(deploy.value.as_ref(), &location, &mut issues);
            check_templates(&deploy.args, &declared, &location, &mut issues);
            declared.contracts.insert(deploy.name.clone());
        }
    }

    for scenario in &suite.scenarios {
        for (index, step) in scenario.steps.iter().enumerate() {
            let location = format!(
                "scenario '{}', step {} '{}'",
                scenario.name,
                index + 1,
                step.display_name()
            );
            check_step(step, &mut declared, &location, &mut issues);
        }
    }

    if let Some(teardown) = &suite.teardown {
        for (index, step) in teardown.steps.iter().enumerate() {
            let location = format!("teardown step {} '{}'", index + 1, step.display_name());
            check_step(step, &mut declared, &location, &mut issues);
        }
    }

    issues
}

fn check_step(
    step: &Step,
    declared: &mut Declared,
    location: &str,
    issues: &mut Vec<CheckIssue>,
) {
    check_signer(step.from.as_deref(), declared, location, issues);
    check_value(step.value.as_ref(), location, issues);
    check_templates(step.action.args(), declared, location, issues);

    if let Some(events) = step.expect.as_ref().and_then(|e| e.events.as_ref()) {
        for event in events {
            if let EventExpectation::Detailed { args, .. } = event {
                let values: Vec<Value> = args.values().cloned().collect();
                check_templates(&values, declared, location, issues);
            }
        }
    }

    match &step.action {
        Action::Deploy { contract, .. } => {
            declared.contracts.insert(contract.clone());
        }
        Action::Call { contract, .. } => {
            if !declared.contracts.contains(contract) {
                issues.push(CheckIssue {
                    location: location.to_string(),
                    message: format!("contract '{contract}' is not deployed or attached"),
                });
            }
        }
    }
}

fn check_signer(
    from: Option<&str>,
    declared: &Declared,
    location: &str,
    issues: &mut Vec<CheckIssue>,
) {
    if let Some(name) = from {
        if !declared.knows_signer(name) {
            issues.push(CheckIssue {
                location: location.to_string(),
                message: format!("signer '{name}' is not declared"),
            });
        }
    }
}

fn check_value(value: Option<&Value>, location: &str, issues: &mut Vec<CheckIssue>) {
    if let Some(Err(e)) = value.map(parse_value) {
        issues.push(CheckIssue {
            location: location.to_string(),
            message: e.to_string(),
        });
    }
}

fn check_templates(
    values: &[Value],
    declared: &Declared,
    location: &str,
    issues: &mut Vec<CheckIssue>,
) {
    for text in values.iter().filter_map(Value::as_str) {
        let problem = match TemplateToken::parse(text) {
            Some(TemplateToken::ContractAddress(name)) if !declared.contracts.contains(&name) => {
                format!("template '{text}' refers to unknown contract '{name}'")
            }
            Some(TemplateToken::NamedSigner(name)) if !declared.knows_signer(&name) => {
                format!("template '{text}' refers to unknown identifier '{name}'")
            }
            _ => continue,
        };
        issues.push(CheckIssue {
            location: location.to_string(),
            message: problem,
        });
    }
}
