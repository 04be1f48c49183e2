//! Error handling for Holdings
//!
//! Defines the ledger error taxonomy and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use thiserror::Error;

/// Core error types for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("referential inconsistency: {0}")]
    ReferentialInconsistency(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for ledger operations
pub type Result<T> = anyhow::Result<T>;
