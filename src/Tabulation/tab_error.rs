//! Error types of the tabulation cache.
//!
//! Two families are kept apart:
//! - `TabulationError`: recoverable problems of the cache front end (configuration files,
//!   wrong query dimension, failing evaluator). Returned through `Result`.
//! - `TreeError`: corrupted bookkeeping inside the binary tree. The structural operations
//!   (`insert`, `delete`) do not return it, they abort via `invariant_violation`; only the
//!   diagnostic `BinaryTree::check_integrity` reports it as a value.
use log::error;
use thiserror::Error;

/// errors of the tabulation front end and its configuration
#[derive(Debug, Error)]
pub enum TabulationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize tabulation config: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid tabulation config: {0}")]
    InvalidConfig(String),
    #[error("Query has dimension {found}, the table was built for dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Evaluator failed: {0}")]
    Evaluation(String),
    #[error("Logger already initialized: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// errors found by the integrity check of the binary tree
#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Corrupted parent/child links cannot be repaired: log and abort.
#[track_caller]
pub(crate) fn invariant_violation(msg: String) -> ! {
    error!("binary tree invariant violated: {}", msg);
    panic!("{}", TreeError::InvariantViolation(msg));
}
