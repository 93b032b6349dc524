//! Error types for kf-core

use thiserror::Error;

/// Core error type for Keyfill
#[derive(Error, Debug)]
pub enum CoreError {
    /// K001: Configuration file not found
    #[error("[K001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// K002: Failed to parse configuration file
    #[error("[K002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// K003: Invalid configuration value
    #[error("[K003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// K004: Circular dependency between foreign-key configs
    #[error("[K004] Circular dependency detected between foreign keys: {cycle}")]
    CircularDependency { cycle: String },

    /// K005: depends_on names a config that does not exist in the domain
    #[error("[K005] Foreign key '{name}' depends on unknown foreign key '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    /// K006: Two foreign-key configs share a name
    #[error("[K006] Duplicate foreign key name '{name}' in domain '{domain}'")]
    DuplicateForeignKey { name: String, domain: String },

    /// K007: Aggregation parameters are missing or malformed
    #[error("[K007] Invalid aggregation for '{fk}.{column}': {message}")]
    InvalidAggregation {
        fk: String,
        column: String,
        message: String,
    },

    /// K008: Domain not present in the configuration
    #[error("[K008] Unknown domain '{name}'. Available domains: {available}")]
    UnknownDomain { name: String, available: String },

    /// K009: A fact batch is missing a column a mapping requires
    #[error("[K009] Fact batch has no column '{column}' required by '{fk}'")]
    MissingColumn { fk: String, column: String },

    /// K010: Fact batch columns have different lengths
    #[error("[K010] Fact column '{column}' has {actual} rows, expected {expected}")]
    ColumnLengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// K011: IO error with file path context
    #[error("[K011] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// K012: YAML parse error
    #[error("[K012] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True for the configuration error class: problems detected while
    /// loading or resolving configuration, before any database access.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CoreError::ConfigNotFound { .. }
                | CoreError::ConfigParseError { .. }
                | CoreError::ConfigInvalid { .. }
                | CoreError::CircularDependency { .. }
                | CoreError::UnknownDependency { .. }
                | CoreError::DuplicateForeignKey { .. }
                | CoreError::InvalidAggregation { .. }
                | CoreError::UnknownDomain { .. }
                | CoreError::YamlParse(_)
        )
    }
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
