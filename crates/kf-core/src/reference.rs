//! Reference-table records produced by a backfill pass, plus the probe used
//! to learn what the reference table already holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A possibly schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedTable {
    pub schema: Option<String>,
    pub table: String,
}

impl QualifiedTable {
    pub fn new(schema: Option<String>, table: impl Into<String>) -> Self {
        Self {
            schema,
            table: table.into(),
        }
    }
}

impl std::fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => f.write_str(&self.table),
        }
    }
}

/// Storage kind of a reference-table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Single value; null-guarded on update
    Scalar,
    /// Array value; never null, merged as a deduplicated union on conflict
    Array,
}

/// A reference-table column written by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl TargetColumn {
    pub fn is_array(&self) -> bool {
        self.kind == ColumnKind::Array
    }
}

/// Where a reference row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Supplied by a trusted upstream system
    Authoritative,
    /// Synthesized from fact data by this engine
    AutoDerived,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Authoritative => "authoritative",
            SourceTag::AutoDerived => "auto_derived",
        }
    }
}

/// Data-quality metadata attached to every derived row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: SourceTag,
    pub needs_review: bool,
    pub derived_from_domain: String,
    pub derived_at: DateTime<Utc>,
}

impl Provenance {
    /// Provenance for a row derived during a run of `domain`
    pub fn auto_derived(domain: &str, derived_at: DateTime<Utc>) -> Self {
        Self {
            source: SourceTag::AutoDerived,
            needs_review: true,
            derived_from_domain: domain.to_string(),
            derived_at,
        }
    }
}

/// One candidate reference row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRecord {
    /// Key value as it appeared in the fact batch
    pub key: Value,
    /// Text form of the key used for comparisons
    pub key_text: String,
    /// Column values, aligned with the batch's target columns
    pub values: Vec<Value>,
    /// Set once the record is tagged for persistence
    pub provenance: Option<Provenance>,
}

/// What a reference table already holds for one key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExistingRow {
    /// Scalar backfill columns that are currently null
    pub null_columns: HashSet<String>,
    /// Current contents of array columns (null reads as empty)
    pub arrays: HashMap<String, Vec<Value>>,
    /// Array columns stored as null rather than an empty array
    pub null_arrays: HashSet<String>,
}

impl ExistingRow {
    /// True when the row has at least one null scalar or empty array column
    pub fn has_gaps(&self) -> bool {
        !self.null_columns.is_empty() || self.arrays.values().any(|a| a.is_empty())
    }
}

/// Existence query against one reference table
#[derive(Debug, Clone)]
pub struct ExistingProbe {
    pub table: QualifiedTable,
    pub key_column: String,
    /// Scalar columns whose nullness is reported
    pub null_check_columns: Vec<String>,
    /// Array columns whose contents are returned
    pub array_columns: Vec<String>,
    /// Key values to look up
    pub keys: Vec<Value>,
}
