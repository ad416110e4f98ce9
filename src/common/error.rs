//! Error types for the scenario engine
//!
//! Configuration, reference and template errors are raised before any chain
//! interaction. Execution failures and expectation mismatches are never
//! errors: they are captured into scenario results.

use std::io;
use thiserror::Error;

use crate::chain::ChainError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario engine
#[derive(Error, Debug)]
pub enum Error {
    // === Engine Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Reference error: {0}")]
    Reference(String),

    #[error("Cannot resolve template token '{token}': {reason}")]
    TemplateResolution { token: String, reason: String },

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Teardown failed: {0}")]
    TeardownFailed(String),

    // === Run Outcome ===
    #[error("{0} suite(s) failed")]
    SuitesFailed(usize),

    #[error("{0} problem(s) found")]
    CheckFailed(usize),

    // === Suite Source Errors ===
    #[error("Failed to load suite '{path}': {message}")]
    SuiteLoad { path: String, message: String },

    // === Configuration File Errors ===
    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Chain Errors ===
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl Error {
    /// Create a reference error for a contract missing from the context
    pub fn unknown_contract(name: &str) -> Self {
        Self::Reference(format!("contract '{name}' is not deployed or attached"))
    }

    /// Create a reference error for an undeclared signer
    pub fn unknown_signer(name: &str) -> Self {
        Self::Reference(format!("signer '{name}' is not declared"))
    }

    /// Create a reference error for a function missing from a contract's ABI
    pub fn unknown_function(contract: &str, function: &str, arg_count: usize) -> Self {
        Self::Reference(format!(
            "contract '{contract}' has no function '{function}' taking {arg_count} argument(s)"
        ))
    }

    /// Create a template resolution error
    pub fn template(token: &str, reason: impl Into<String>) -> Self {
        Self::TemplateResolution {
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}
