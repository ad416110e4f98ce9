//! Expectation matching
//!
//! Compares an observed [`StepOutcome`] with a declared [`Expectation`].
//! Every field is checked on its own so one comparison reports every
//! mismatch. Matching never touches the chain or the context.

use serde_json::Value;

use crate::chain::abi::parse_uint_str;

use super::config::{EventExpectation, Expectation, ReturnType};
use super::executor::StepOutcome;
use super::template::TemplateResolver;

/// Result of matching one outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub ok: bool,
    pub failures: Vec<String>,
}

impl MatchResult {
    fn from_failures(failures: Vec<String>) -> Self {
        Self {
            ok: failures.is_empty(),
            failures,
        }
    }
}

/// Match `outcome` against `expectation`
///
/// `resolver` resolves template tokens in expected event arguments.
pub fn matches(
    outcome: &StepOutcome,
    expectation: &Expectation,
    resolver: &TemplateResolver<'_>,
) -> MatchResult {
    let mut failures = Vec::new();

    if expectation.success != outcome.succeeded {
        failures.push(if expectation.success {
            format!(
                "expected success but the step failed: {}",
                outcome.revert_reason.as_deref().unwrap_or("no reason given")
            )
        } else {
            "expected the step to revert but it succeeded".to_string()
        });
    }

    if let Some(expected) = &expectation.return_value {
        match &outcome.return_value {
            Some(actual) if normalize(actual) == normalize(expected) => {}
            Some(actual) => failures.push(format!(
                "returnValue: expected '{}', got '{}'",
                shown(expected),
                shown(actual)
            )),
            None => failures.push(format!(
                "returnValue: expected '{}' but nothing was returned",
                shown(expected)
            )),
        }
    }

    if let Some(kind) = expectation.return_type {
        match &outcome.return_value {
            Some(actual) if has_type(actual, kind) => {}
            Some(actual) => failures.push(format!(
                "returnType: expected {kind}, got '{}'",
                shown(actual)
            )),
            None => failures.push(format!("returnType: expected {kind} but nothing was returned")),
        }
    }

    if !expectation.success {
        if let Some(expected) = &expectation.revert_reason {
            match &outcome.revert_reason {
                Some(actual) if actual == expected || actual.contains(expected.as_str()) => {}
                Some(actual) => failures.push(format!(
                    "revertReason: expected '{expected}', got '{actual}'"
                )),
                None => failures.push(format!(
                    "revertReason: expected '{expected}' but no revert message was available"
                )),
            }
        }
    }

    if let Some(events) = &expectation.events {
        match_events(outcome, events, resolver, &mut failures);
    }

    MatchResult::from_failures(failures)
}

fn match_events(
    outcome: &StepOutcome,
    expected: &[EventExpectation],
    resolver: &TemplateResolver<'_>,
    failures: &mut Vec<String>,
) {
    let emitted = &outcome.emitted_events;
    for (i, expectation) in expected.iter().enumerate() {
        let position = i + 1;
        let Some(actual) = emitted.get(i) else {
            failures.push(format!(
                "event #{position}: expected {} but only {} event(s) were emitted",
                expectation.name(),
                emitted.len()
            ));
            continue;
        };

        if actual.name != expectation.name() {
            failures.push(format!(
                "event #{position}: expected {}, got {}",
                expectation.name(),
                actual.name
            ));
            continue;
        }

        let EventExpectation::Detailed { args, .. } = expectation else {
            continue;
        };
        for (key, resolved) in resolver.resolve_mapping(args) {
            let expected_value = match resolved {
                Ok(value) => value,
                Err(e) => {
                    failures.push(format!("event #{position} {}: {key}: {e}", actual.name));
                    continue;
                }
            };
            match actual.args.get(&key) {
                None => failures.push(format!(
                    "event #{position} {}: missing argument '{key}'",
                    actual.name
                )),
                Some(value) if normalize(value) != normalize(&expected_value) => {
                    failures.push(format!(
                        "event #{position} {}: argument '{key}' expected '{}', got '{}'",
                        actual.name,
                        shown(&expected_value),
                        shown(value)
                    ))
                }
                Some(_) => {}
            }
        }
    }
}

/// Canonical string form used for comparisons
///
/// Integers become canonical decimals (sign kept, leading zeros stripped,
/// `-0` is `0`), addresses are lowercased, booleans become `true`/`false`.
/// Sequences normalize element-wise.
pub fn normalize(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => normalize_str(&n.to_string()),
        Value::String(s) => normalize_str(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(normalize).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(_) => value.to_string(),
    }
}

fn shown(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize_str(s: &str) -> String {
    let s = s.trim();
    if let Some(canonical) = canonical_decimal(s) {
        return canonical;
    }
    if is_address(s) {
        return s.to_ascii_lowercase();
    }
    if let Some(canonical) = canonical_hex(s) {
        return canonical;
    }
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        return s.to_ascii_lowercase();
    }
    s.to_string()
}

fn canonical_decimal(s: &str) -> Option<String> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    Some(match (trimmed.is_empty(), negative) {
        (true, _) => "0".to_string(),
        (false, true) => format!("-{trimmed}"),
        (false, false) => trimmed.to_string(),
    })
}

/// `0x`-prefixed quantities up to 256 bits, rendered in decimal
fn canonical_hex(s: &str) -> Option<String> {
    if !is_hex(s) || s.len() == 2 || s.len() > 66 {
        return None;
    }
    parse_uint_str(s).ok().map(|n| n.to_string())
}

fn is_address(s: &str) -> bool {
    is_hex(s) && s.len() == 42
}

fn is_hex(s: &str) -> bool {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn has_type(value: &Value, kind: ReturnType) -> bool {
    match kind {
        ReturnType::Uint => value.as_u64().is_some() || {
            let n = normalize(value);
            canonical_decimal(&n).is_some() && !n.starts_with('-')
        },
        ReturnType::Int => value.is_i64() || value.is_u64() || {
            matches!(value, Value::String(s) if canonical_decimal(s.trim()).is_some())
        },
        ReturnType::Bool => match value {
            Value::Bool(_) => true,
            Value::String(s) => s == "true" || s == "false",
            _ => false,
        },
        ReturnType::Address => value.as_str().is_some_and(|s| is_address(s.trim())),
        ReturnType::Bytes => value.as_str().is_some_and(|s| is_hex(s) && s.len() % 2 == 0),
        ReturnType::String => value.is_string(),
    }
}
