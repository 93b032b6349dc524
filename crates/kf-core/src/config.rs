//! Configuration types and parsing for keyfill.yml

use crate::error::{CoreError, CoreResult};
use crate::foreign_key::ForeignKeyConfig;
use crate::resolver::ForeignKeyDag;
use crate::serde_helpers::default_true;
use kf_expr::ExpressionEvaluator;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Environment variable consulted when no `--target` flag is given
pub const TARGET_ENV_VAR: &str = "KF_TARGET";

/// Main project configuration from keyfill.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Named target configurations (e.g., dev, prod)
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,

    /// Provenance columns written on auto-derived rows
    #[serde(default)]
    pub tracking: TrackingColumns,

    /// Fact domains and their foreign-key relationships
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,
}

/// Target-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Database configuration override
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Database type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
    /// PostgreSQL (SQL generation only)
    Postgres,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
            DbType::Postgres => write!(f, "postgres"),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database type (duckdb or postgres)
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database path (for DuckDB file-based or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
        }
    }
}

const DEFAULT_DB_PATH: &str = ":memory:";

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

/// Names of the provenance columns on reference tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingColumns {
    /// Write provenance columns at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_source_column")]
    pub source_column: String,

    #[serde(default = "default_needs_review_column")]
    pub needs_review_column: String,

    #[serde(default = "default_domain_column")]
    pub domain_column: String,

    #[serde(default = "default_derived_at_column")]
    pub derived_at_column: String,
}

fn default_source_column() -> String {
    "_source".to_string()
}

fn default_needs_review_column() -> String {
    "_needs_review".to_string()
}

fn default_domain_column() -> String {
    "_derived_from_domain".to_string()
}

fn default_derived_at_column() -> String {
    "_derived_at".to_string()
}

impl Default for TrackingColumns {
    fn default() -> Self {
        Self {
            enabled: true,
            source_column: default_source_column(),
            needs_review_column: default_needs_review_column(),
            domain_column: default_domain_column(),
            derived_at_column: default_derived_at_column(),
        }
    }
}

impl TrackingColumns {
    /// Tracking disabled: generated SQL carries no provenance columns
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Column names in write order; empty when tracking is disabled
    pub fn names(&self) -> Vec<&str> {
        if !self.enabled {
            return Vec::new();
        }
        vec![
            self.source_column.as_str(),
            self.needs_review_column.as_str(),
            self.domain_column.as_str(),
            self.derived_at_column.as_str(),
        ]
    }
}

/// Where the CLI reads a domain's fact batch from. Exactly one field is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FactsSource {
    /// A table or view in the configured database
    #[serde(default)]
    pub table: Option<String>,
    /// An arbitrary SELECT statement
    #[serde(default)]
    pub query: Option<String>,
    /// A CSV file, read by the database engine
    #[serde(default)]
    pub csv: Option<String>,
}

impl FactsSource {
    fn validate(&self, domain: &str) -> CoreResult<()> {
        let set = [&self.table, &self.query, &self.csv]
            .iter()
            .filter(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .count();
        if set != 1 {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "Domain '{domain}' facts must set exactly one of 'table', 'query' or 'csv'"
                ),
            });
        }
        Ok(())
    }
}

/// One fact domain: its fact source and foreign-key relationships
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    /// Default fact source for CLI invocations
    #[serde(default)]
    pub facts: Option<FactsSource>,

    /// Foreign-key relationships in declaration order
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyConfig>,
}

impl DomainConfig {
    /// Look up a foreign-key config by name
    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyConfig> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    /// Validate every config and the dependency graph of this domain
    pub fn validate(
        &self,
        domain: &str,
        evaluator: &ExpressionEvaluator,
        tracking: &TrackingColumns,
    ) -> CoreResult<()> {
        if let Some(facts) = &self.facts {
            facts.validate(domain)?;
        }
        let reserved = tracking.names();
        for fk in &self.foreign_keys {
            fk.validate(evaluator, &reserved)?;
        }
        ForeignKeyDag::build(domain, &self.foreign_keys)?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a project directory
    /// Looks for keyfill.yml or keyfill.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("keyfill.yml");
        let yaml_path = dir.join("keyfill.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Parse and validate configuration text
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        let tracking = self.tracking.names();
        for (i, name) in tracking.iter().enumerate() {
            if name.trim().is_empty() || tracking[..i].contains(name) {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "Tracking column names must be non-empty and distinct, got '{name}'"
                    ),
                });
            }
        }

        let evaluator = ExpressionEvaluator::new();
        for (name, domain) in &self.domains {
            if name.trim().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: "Domain name cannot be empty".to_string(),
                });
            }
            domain.validate(name, &evaluator, &self.tracking)?;
        }

        Ok(())
    }

    /// Get a domain by name
    pub fn domain(&self, name: &str) -> CoreResult<&DomainConfig> {
        self.domains.get(name).ok_or_else(|| CoreError::UnknownDomain {
            name: name.to_string(),
            available: self.domain_names().join(", "),
        })
    }

    /// All domain names in sorted order
    pub fn domain_names(&self) -> Vec<&str> {
        self.domains.keys().map(|s| s.as_str()).collect()
    }

    /// Get database configuration, optionally applying target overrides
    ///
    /// If target is specified and exists, uses target's database config.
    /// Otherwise, uses the base database config.
    pub fn get_database_config(&self, target: Option<&str>) -> CoreResult<DatabaseConfig> {
        match target {
            Some(name) => {
                let target_config =
                    self.targets
                        .get(name)
                        .ok_or_else(|| CoreError::ConfigInvalid {
                            message: format!(
                                "Target '{}' not found. Available targets: {}",
                                name,
                                self.targets
                                    .keys()
                                    .map(|k| k.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            ),
                        })?;

                Ok(target_config
                    .database
                    .clone()
                    .unwrap_or_else(|| self.database.clone()))
            }
            None => Ok(self.database.clone()),
        }
    }

    /// Resolve target from CLI flag or KF_TARGET environment variable
    ///
    /// Priority: CLI flag > KF_TARGET env var > None
    pub fn resolve_target(cli_target: Option<&str>) -> Option<String> {
        cli_target
            .map(String::from)
            .or_else(|| std::env::var(TARGET_ENV_VAR).ok())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
