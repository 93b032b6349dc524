//! Error types for kf-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Concurrent writer or lock contention (D004)
    #[error("[D004] Write conflict: {0}")]
    Conflict(String),

    /// Mutex poisoned (D005)
    #[error("[D005] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// A result row did not have the expected shape (D006)
    #[error("[D006] Unexpected result shape: {0}")]
    UnexpectedResult(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// True when retrying the same statement may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::ConnectionError(_) | DbError::Conflict(_))
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        classify(err.to_string())
    }
}

/// Classify a DuckDB error message.
///
/// duckdb::Error does not expose structured variants, so the message text is
/// all there is to go on.
pub(crate) fn classify(msg: String) -> DbError {
    if msg.contains("Table with name")
        || msg.contains("View with name")
        || msg.contains("Table or view with name")
        || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
    {
        DbError::TableNotFound(msg)
    } else if msg.contains("TransactionContext Error") {
        // Commit-time failures come from a concurrent transaction, including
        // a duplicate key that another writer committed first
        DbError::Conflict(msg)
    } else if msg.contains("Conflict")
        || msg.contains("conflict")
        || msg.contains("Could not set lock")
    {
        // ON CONFLICT clause errors are data errors, not contention
        if msg.contains("ON CONFLICT") {
            DbError::ExecutionError(msg)
        } else {
            DbError::Conflict(msg)
        }
    } else {
        DbError::ExecutionError(msg)
    }
}
