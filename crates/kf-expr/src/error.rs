//! Error types for kf-expr

use thiserror::Error;

/// Expression compilation and evaluation errors
#[derive(Error, Debug)]
pub enum ExprError {
    /// Expression does not parse (X001)
    #[error("[X001] Expression syntax error: {0}")]
    Syntax(String),

    /// Expression raised while evaluating (X002)
    #[error("[X002] Expression evaluation failed: {0}")]
    Evaluation(String),

    /// Result could not be converted to JSON (X003)
    #[error("[X003] Expression result is not serializable: {0}")]
    Serialization(String),

    /// A scalar was required but the expression produced a collection (X004)
    #[error("[X004] Expression returned a non-scalar value of kind '{kind}'")]
    NonScalar { kind: String },
}

impl ExprError {
    /// True for errors that only show up when the expression runs.
    pub fn is_runtime(&self) -> bool {
        !matches!(self, ExprError::Syntax(_))
    }
}

/// Result type alias for ExprError
pub type ExprResult<T> = Result<T, ExprError>;
