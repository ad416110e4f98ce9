//! Template token resolution
//!
//! A string whose whole content is `{{identifier}}` is a token. Tokens are
//! resolved against a [`RuntimeContext`], the signer invoking the current
//! step and a clock. Anything else is a literal and passes through.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use super::context::RuntimeContext;
use crate::chain::Address;
use crate::common::{Error, Result};

/// A parsed template token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateToken {
    /// `{{signer}}`: the signer invoking the step
    Signer,
    /// `{{now}}`: unix time in seconds
    Now,
    /// `{{zeroAddress}}`
    ZeroAddress,
    /// `{{<name>.address}}`: address of a named contract
    ContractAddress(String),
    /// `{{<name>}}`: address of a named signer
    NamedSigner(String),
}

impl TemplateToken {
    /// Parse `text` as a token; `None` when it is a literal
    pub fn parse(text: &str) -> Option<Self> {
        let inner = text.strip_prefix("{{")?.strip_suffix("}}")?.trim();
        Some(match inner {
            "signer" => Self::Signer,
            "now" => Self::Now,
            "zeroAddress" => Self::ZeroAddress,
            other => match other.strip_suffix(".address") {
                Some(contract) => Self::ContractAddress(contract.to_string()),
                None => Self::NamedSigner(other.to_string()),
            },
        })
    }
}

impl std::fmt::Display for TemplateToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signer => write!(f, "{{{{signer}}}}"),
            Self::Now => write!(f, "{{{{now}}}}"),
            Self::ZeroAddress => write!(f, "{{{{zeroAddress}}}}"),
            Self::ContractAddress(name) => write!(f, "{{{{{name}.address}}}}"),
            Self::NamedSigner(name) => write!(f, "{{{{{name}}}}}"),
        }
    }
}

/// Resolves template tokens for one step
pub struct TemplateResolver<'a> {
    context: &'a RuntimeContext,
    active_signer: Option<Address>,
    /// Fixed unix time; the system clock when unset
    now: Option<u64>,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(context: &'a RuntimeContext) -> Self {
        Self {
            context,
            active_signer: None,
            now: None,
        }
    }

    pub fn with_active_signer(mut self, signer: Address) -> Self {
        self.active_signer = Some(signer);
        self
    }

    /// Pin `{{now}}` to a fixed unix time
    pub fn with_clock(mut self, unix_secs: u64) -> Self {
        self.now = Some(unix_secs);
        self
    }

    /// Resolve a single value; non-token values are returned unchanged
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        let Value::String(text) = value else {
            return Ok(value.clone());
        };
        match TemplateToken::parse(text) {
            Some(token) => self.resolve_token(&token, text).map(Value::String),
            None => Ok(value.clone()),
        }
    }

    /// Resolve a sequence of step arguments
    pub fn resolve_args(&self, args: &[Value]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.resolve(arg)).collect()
    }

    /// Resolve every value of a mapping independently
    pub fn resolve_mapping(
        &self,
        values: &BTreeMap<String, Value>,
    ) -> BTreeMap<String, Result<Value>> {
        values
            .iter()
            .map(|(key, value)| (key.clone(), self.resolve(value)))
            .collect()
    }

    fn resolve_token(&self, token: &TemplateToken, text: &str) -> Result<String> {
        match token {
            TemplateToken::Signer => self
                .active_signer
                .map(|a| a.to_string())
                .ok_or_else(|| Error::template(text, "no signer is active")),
            TemplateToken::Now => Ok(self.now.unwrap_or_else(system_now).to_string()),
            TemplateToken::ZeroAddress => Ok(Address::ZERO.to_string()),
            TemplateToken::ContractAddress(name) => self
                .context
                .contracts
                .get(name)
                .map(|h| h.address.to_string())
                .ok_or_else(|| Error::template(text, format!("unknown contract '{name}'"))),
            TemplateToken::NamedSigner(name) => self
                .context
                .signers
                .get(name)
                .map(|s| s.address.to_string())
                .ok_or_else(|| Error::template(text, format!("unknown identifier '{name}'"))),
        }
    }
}

fn system_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
