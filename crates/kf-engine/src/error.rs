//! Error types for kf-engine

use kf_core::CoreError;
use kf_db::DbError;
use kf_sql::SqlError;
use thiserror::Error;

/// Errors raised while backfilling one domain
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration rejected before any database access (E001)
    #[error("[E001] {0}")]
    Config(#[from] CoreError),

    /// Statement could not be generated (E002)
    #[error("[E002] {0}")]
    Sql(#[from] SqlError),

    /// Reference table read or write failed (E003)
    #[error("[E003] {0}")]
    Database(#[from] DbError),

    /// A required mapping reads a column the fact batch lacks (E004)
    #[error("[E004] Fact batch has no column '{column}' required by '{fk}.{target}'")]
    MissingFactColumn {
        fk: String,
        target: String,
        column: String,
    },
}

impl EngineError {
    /// Transient database errors may succeed on retry; configuration and data
    /// errors will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Database(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for EngineError
pub type EngineResult<T> = Result<T, EngineError>;
