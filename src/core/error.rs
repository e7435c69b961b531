use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Unique constraint violation: '{constraint}' on table '{table}' already contains key {key}")]
    UniqueConstraintViolation {
        table: String,
        constraint: String,
        key: String,
    },

    #[error("Deadlock detected: {0}")]
    DeadlockDetected(String),

    #[error("Lock wait timeout: {0}")]
    LockTimeout(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

/// Store-level conflicts that a fresh attempt can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another transaction committed the same unique key first.
    UniqueConstraint,
    /// The store aborted the transaction to break a lock cycle.
    Deadlock,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UniqueConstraint => "unique_constraint",
            Self::Deadlock => "deadlock",
        };
        write!(f, "{label}")
    }
}

impl DbError {
    /// Classifies the error as a retryable conflict, or `None` when fatal.
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            Self::UniqueConstraintViolation { .. } => Some(ConflictKind::UniqueConstraint),
            Self::DeadlockDetected(_) => Some(ConflictKind::Deadlock),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.conflict_kind().is_some()
    }
}
