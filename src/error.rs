//! Error taxonomy.
//!
//! Converter errors abort the conversion of one result candidate;
//! `ConversionExhausted` drops one execution. Neither is allowed to take
//! down sibling executions of a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::Phase;

/// A trace or descriptor table that cannot be turned into models.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    #[error("dangling cyclic reference: no model for ref id {ref_id} in the {phase} state")]
    DanglingReference { ref_id: u32, phase: Phase },
    #[error("no conversion rule for {0}")]
    UnsupportedDescriptor(String),
    #[error("expression e{0} is not in the trace")]
    UnknownExpr(u32),
    #[error("descriptor d{0} is not in the descriptor table")]
    UnknownDescriptor(u32),
    #[error("malformed trace: {0}")]
    MalformedTrace(String),
}

/// A model shape that no converter output can have. Always a bug in the
/// converter or in the caller, never a data problem.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invariant violation: {0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Every result candidate of an execution failed to convert.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no result candidate of {method} could be converted ({} tried)", .causes.len())]
pub struct ConversionExhausted {
    pub method: String,
    /// One entry per candidate, in the order they were tried.
    pub causes: Vec<String>,
}

/// Failure while executing an assertion block against concrete values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("model {0} cannot be materialized: {1}")]
    NotMaterializable(String, String),
    #[error("variable `{0}` is not bound")]
    UnboundVariable(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reading execution records from disk.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid execution records: {0}")]
    Json(#[from] serde_json::Error),
}
