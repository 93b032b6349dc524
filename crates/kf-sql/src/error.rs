//! Error types for kf-sql

use thiserror::Error;

/// SQL generation and validation errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// SQL parse error (S001)
    #[error("[S001] SQL parse error at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// Empty SQL (S002)
    #[error("[S002] SQL is empty")]
    EmptySql,

    /// Generated text holds more or fewer than one statement (S003)
    #[error("[S003] Expected exactly one statement, found {0}")]
    StatementCount(usize),

    /// Upsert has nothing to write (S004)
    #[error("[S004] Upsert into '{0}' has no records")]
    NoRecords(String),

    /// A record's values do not line up with the statement's columns (S005)
    #[error("[S005] Record '{key}' has {actual} values, expected {expected}")]
    RecordShape {
        key: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
