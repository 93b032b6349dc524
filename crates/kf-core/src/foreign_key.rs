//! Foreign-key relationship descriptors: which fact column references which
//! reference table, and how to derive the reference row's columns.

use crate::error::{CoreError, CoreResult};
use crate::names::ForeignKeyName;
use crate::reference::{ColumnKind, QualifiedTable, TargetColumn};
use crate::serde_helpers::default_true;
use kf_expr::ExpressionEvaluator;
use serde::{Deserialize, Serialize};

/// How auto-derived rows interact with rows already in the reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackfillMode {
    /// Insert keys that are absent; never touch existing rows (default).
    /// Array-merge columns still accumulate on existing rows.
    #[default]
    InsertMissing,
    /// Insert absent keys and fill columns that are currently null on existing rows
    FillNullOnly,
}

impl std::fmt::Display for BackfillMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackfillMode::InsertMissing => write!(f, "insert_missing"),
            BackfillMode::FillNullOnly => write!(f, "fill_null_only"),
        }
    }
}

/// Strategy that reduces a group of fact rows sharing one key to a single value.
///
/// Each variant carries exactly the parameters it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum AggregationConfig {
    /// First value in the group
    #[default]
    First,
    /// Value from the row with the greatest `order_column`; ties keep the first row
    MaxBy { order_column: String },
    /// Distinct non-blank values joined by `separator`
    ConcatDistinct {
        separator: String,
        #[serde(default)]
        sort: bool,
    },
    /// Number of distinct non-blank values
    CountDistinct,
    /// Fixed literal text, independent of the rows
    Template { text: String },
    /// Expression producing one scalar per group
    Lambda { code: String },
    /// Expression producing a sequence merged into an array column
    JsonbAppend { code: String },
}

impl AggregationConfig {
    /// Strategy name as written in configuration
    pub fn strategy_name(&self) -> &'static str {
        match self {
            AggregationConfig::First => "first",
            AggregationConfig::MaxBy { .. } => "max_by",
            AggregationConfig::ConcatDistinct { .. } => "concat_distinct",
            AggregationConfig::CountDistinct => "count_distinct",
            AggregationConfig::Template { .. } => "template",
            AggregationConfig::Lambda { .. } => "lambda",
            AggregationConfig::JsonbAppend { .. } => "jsonb_append",
        }
    }

    /// Whether the strategy reads the mapping's source column
    pub fn reads_source_column(&self) -> bool {
        matches!(
            self,
            AggregationConfig::First
                | AggregationConfig::MaxBy { .. }
                | AggregationConfig::ConcatDistinct { .. }
                | AggregationConfig::CountDistinct
        )
    }

    /// Whether the target column is an array that merges on conflict
    pub fn is_array_merge(&self) -> bool {
        matches!(self, AggregationConfig::JsonbAppend { .. })
    }

    /// The user expression, for code-based strategies
    pub fn code(&self) -> Option<&str> {
        match self {
            AggregationConfig::Lambda { code } | AggregationConfig::JsonbAppend { code } => {
                Some(code)
            }
            _ => None,
        }
    }
}

/// Maps one fact column onto one reference-table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackfillColumnMapping {
    /// Fact column to read. Not needed by `template`, `lambda` and `jsonb_append`.
    #[serde(default)]
    pub source: Option<String>,

    /// Reference-table column to write
    pub target: String,

    /// Drop this mapping for a run when its fact columns are absent
    #[serde(default)]
    pub optional: bool,

    /// Aggregation strategy (defaults to `first`)
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

impl BackfillColumnMapping {
    /// Target column with its storage kind
    pub fn target_column(&self) -> TargetColumn {
        TargetColumn {
            name: self.target.clone(),
            kind: if self.aggregation.is_array_merge() {
                ColumnKind::Array
            } else {
                ColumnKind::Scalar
            },
        }
    }

    /// Fact columns this mapping needs to be present
    pub fn required_fact_columns(&self) -> Vec<&str> {
        let mut cols = Vec::new();
        if self.aggregation.reads_source_column() {
            if let Some(source) = self.source.as_deref() {
                cols.push(source);
            }
        }
        if let AggregationConfig::MaxBy { order_column } = &self.aggregation {
            cols.push(order_column.as_str());
        }
        cols
    }
}

/// Declarative description of one foreign-key relationship. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignKeyConfig {
    /// Config name, referenced by other configs' `depends_on`
    pub name: ForeignKeyName,

    /// Fact column holding the foreign-key value
    pub source_column: String,

    /// Reference table receiving backfilled rows
    pub target_table: String,

    /// Key column of the reference table (conflict target)
    pub target_key: String,

    /// Schema of the reference table; dialect default when omitted
    #[serde(default)]
    pub target_schema: Option<String>,

    /// Insert/update behavior
    #[serde(default)]
    pub mode: BackfillMode,

    /// Ignore blank key and column values
    #[serde(default = "default_true")]
    pub skip_blank_values: bool,

    /// Configs whose reference rows must exist before this one runs
    #[serde(default)]
    pub depends_on: Vec<ForeignKeyName>,

    /// Columns derived from fact rows
    #[serde(default)]
    pub backfill_columns: Vec<BackfillColumnMapping>,
}

impl ForeignKeyConfig {
    /// Schema-qualified reference table
    pub fn qualified_table(&self) -> QualifiedTable {
        QualifiedTable::new(self.target_schema.clone(), self.target_table.clone())
    }

    /// True when any mapping merges into an array column
    pub fn has_array_columns(&self) -> bool {
        self.backfill_columns
            .iter()
            .any(|m| m.aggregation.is_array_merge())
    }

    /// Every fact column this config may read, deduplicated, key column first
    pub fn fact_columns(&self) -> Vec<&str> {
        let mut cols = vec![self.source_column.as_str()];
        for mapping in &self.backfill_columns {
            if let Some(source) = mapping.source.as_deref() {
                if !cols.contains(&source) {
                    cols.push(source);
                }
            }
            if let AggregationConfig::MaxBy { order_column } = &mapping.aggregation {
                if !cols.contains(&order_column.as_str()) {
                    cols.push(order_column);
                }
            }
        }
        cols
    }

    /// Validate names and aggregation parameters.
    ///
    /// `reserved` lists column names the engine writes itself (provenance
    /// columns); mappings may not target them.
    pub fn validate(&self, evaluator: &ExpressionEvaluator, reserved: &[&str]) -> CoreResult<()> {
        let fk = self.name.as_str();
        for (field, value) in [
            ("source_column", &self.source_column),
            ("target_table", &self.target_table),
            ("target_key", &self.target_key),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: format!("Foreign key '{fk}' has an empty '{field}'"),
                });
            }
        }
        if self.target_schema.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(CoreError::ConfigInvalid {
                message: format!("Foreign key '{fk}' has an empty 'target_schema'"),
            });
        }

        let mut seen: Vec<&str> = Vec::new();
        for mapping in &self.backfill_columns {
            let column = mapping.target.as_str();
            let invalid = |message: String| CoreError::InvalidAggregation {
                fk: fk.to_string(),
                column: column.to_string(),
                message,
            };

            if column.trim().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "Foreign key '{fk}' has a backfill column with an empty target"
                    ),
                });
            }
            if column == self.target_key {
                return Err(invalid("target column is the reference key".to_string()));
            }
            if reserved.contains(&column) {
                return Err(invalid(
                    "target column is reserved for provenance tracking".to_string(),
                ));
            }
            if seen.contains(&column) {
                return Err(invalid("target column is mapped more than once".to_string()));
            }
            seen.push(column);

            if mapping.aggregation.reads_source_column()
                && mapping.source.as_deref().map_or(true, |s| s.trim().is_empty())
            {
                return Err(invalid(format!(
                    "'{}' requires a 'source' column",
                    mapping.aggregation.strategy_name()
                )));
            }

            match &mapping.aggregation {
                AggregationConfig::MaxBy { order_column } if order_column.trim().is_empty() => {
                    return Err(invalid("'max_by' requires a non-empty 'order_column'".to_string()));
                }
                AggregationConfig::Lambda { code } | AggregationConfig::JsonbAppend { code } => {
                    evaluator.check(code).map_err(|e| invalid(e.to_string()))?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "foreign_key_test.rs"]
mod tests;
