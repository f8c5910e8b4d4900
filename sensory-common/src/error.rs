//! Common error types for the sensory engine

use thiserror::Error;
use uuid::Uuid;

/// Common result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the sensory engine
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input; names the offending field and the violated bound
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// A randomization table already exists for the product type
    #[error("Product type {0} is already randomized")]
    AlreadyRandomized(Uuid),

    /// Evaluator position has no row in the randomization table
    #[error("No assignment for evaluator position {position} (table has {rows} rows)")]
    NoAssignment { position: u8, rows: usize },

    /// The evaluator already has a stored evaluation for this sample
    #[error("Evaluator {evaluator} already evaluated sample {sample}")]
    DuplicateEvaluation { evaluator: Uuid, sample: Uuid },

    /// Another submission for the same (evaluator, sample) pair is in flight
    #[error("duplicate-in-flight: evaluator {evaluator}, sample {sample}")]
    SubmissionInFlight { evaluator: Uuid, sample: Uuid },

    /// A required field is missing from a submission
    #[error("Incomplete submission: missing {0}")]
    IncompleteSubmission(String),

    /// Transport, transaction or timeout failure from the store
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may safely retry the failed operation
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::PersistenceFailure(_) => true,
            Error::Database(db_err) => matches!(
                db_err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ) || db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }

    /// Stable machine-readable name used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput { .. } => "invalid_input",
            Error::AlreadyRandomized(_) => "already_randomized",
            Error::NoAssignment { .. } => "no_assignment",
            Error::DuplicateEvaluation { .. } => "duplicate_evaluation",
            Error::SubmissionInFlight { .. } => "duplicate_in_flight",
            Error::IncompleteSubmission(_) => "incomplete_submission",
            Error::PersistenceFailure(_) => "persistence_failure",
            Error::Internal(_) => "internal",
        }
    }
}
