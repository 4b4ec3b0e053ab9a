#![warn(missing_docs)]
//! # deepscan-contract-tests
//!
//! ## Purpose
//! Loads the frozen JSON contracts under the workspace `contracts/`
//! directory: the analysis response and the persisted history list.
//!
//! ## Responsibilities
//! - Resolve schema and fixture paths.
//! - Compile schemas and report validation failures as plain strings.
//!
//! ## Error model
//! Unreadable or malformed files surface as [`ContractError`]; validation
//! failures are data, not errors.

use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;

/// Schema of the analysis endpoint response body.
pub const ANALYSIS_RESPONSE_SCHEMA: &str = "analysis-response.schema.json";
/// Schema of the value stored under the history key.
pub const HISTORY_SCHEMA: &str = "history.schema.json";

/// Workspace `contracts/` directory.
pub fn contracts_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("contracts")
}

/// Path of a fixture file under `contracts/fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    contracts_dir().join("fixtures").join(name)
}

/// Reads and parses one JSON file.
///
/// # Errors
/// Returns [`ContractError::Io`] or [`ContractError::Json`].
pub fn load_json(path: &Path) -> Result<Value, ContractError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ContractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ContractError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Compiles the schema `name` from `contracts/`.
///
/// # Errors
/// Returns [`ContractError`] when the schema cannot be read or compiled.
pub fn compile_schema(name: &str) -> Result<JSONSchema, ContractError> {
    let path = contracts_dir().join(name);
    let schema = load_json(&path)?;
    JSONSchema::compile(&schema).map_err(|error| ContractError::Schema {
        path,
        message: error.to_string(),
    })
}

/// Every validation failure of `instance`, empty when it conforms.
pub fn violations(schema: &JSONSchema, instance: &Value) -> Vec<String> {
    match schema.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| format!("{}: {error}", error.instance_path))
            .collect(),
    }
}

/// Contract file failures.
#[derive(Debug, Error)]
pub enum ContractError {
    /// File could not be read.
    #[error("cannot read contract '{path}': {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// File is not valid JSON.
    #[error("contract '{path}' is not valid json: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },
    /// Schema failed to compile.
    #[error("schema '{path}' does not compile: {message}")]
    Schema {
        /// Schema file.
        path: PathBuf,
        /// Compiler message.
        message: String,
    },
}
