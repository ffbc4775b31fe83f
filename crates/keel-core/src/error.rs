use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeelError {
    /// Candidate event or projection payload does not match its schema.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filter uses an operator key outside `eq, neq, in, nin, gt, gte, lt, lte`.
    #[error("Unknown filter operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A conditional write lost its race.
    #[error("Concurrent modification detected: {0}")]
    ConcurrencyConflict(String),

    #[error("Cannot save a projection while applied events are present")]
    AppliedEventsPresent,

    #[error("No events to save: projection has neither stored events nor a prior snapshot")]
    NoEventsToSave,

    /// Rejection raised by a validator's invariant check.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl KeelError {
    /// Wrap a storage driver error, keeping it as the error source.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KeelError::Storage(Box::new(err))
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        KeelError::InvariantViolation(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, KeelError::ConcurrencyConflict(_))
    }

    /// Whether re-running the read-validate-write cycle may succeed.
    ///
    /// Nothing in this crate retries on its own; callers own the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeelError::ConcurrencyConflict(_) | KeelError::InvariantViolation(_)
        )
    }
}

impl From<serde_json::Error> for KeelError {
    fn from(err: serde_json::Error) -> Self {
        KeelError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KeelError>;

// Application errors:
//
// Validators usually report rule failures with `KeelError::invariant(..)`.
// Richer domain errors can still travel through `KeelError::Other` via
// `anyhow`, or convert explicitly:
//
// #[derive(Error, Debug)]
// pub enum TodoError {
//     #[error("list {0} is archived")]
//     Archived(String),
// }
//
// impl From<TodoError> for KeelError {
//     fn from(err: TodoError) -> Self {
//         KeelError::invariant(err.to_string())
//     }
// }
