//! Dialect-neutral description of one batched insert-or-merge statement

use crate::error::{SqlError, SqlResult};
use kf_core::{BackfillMode, QualifiedTable, ReferenceRecord, TargetColumn, TrackingColumns};

/// Everything needed to render the single upsert for one reference table in one run.
#[derive(Debug, Clone)]
pub struct UpsertStatement {
    pub table: QualifiedTable,
    /// Conflict target
    pub key_column: String,
    /// Backfill columns, aligned with each record's `values`
    pub columns: Vec<TargetColumn>,
    pub records: Vec<ReferenceRecord>,
    pub mode: BackfillMode,
    pub tracking: TrackingColumns,
}

impl UpsertStatement {
    /// Check the statement is renderable
    pub fn validate(&self) -> SqlResult<()> {
        if self.records.is_empty() {
            return Err(SqlError::NoRecords(self.table.to_string()));
        }
        for record in &self.records {
            if record.values.len() != self.columns.len() {
                return Err(SqlError::RecordShape {
                    key: record.key_text.clone(),
                    expected: self.columns.len(),
                    actual: record.values.len(),
                });
            }
        }
        Ok(())
    }

    /// Columns rewritten when the key already exists.
    ///
    /// Array columns always merge. Scalar columns are null-guarded, and only
    /// under `fill_null_only`. Provenance columns are never touched on conflict.
    pub fn conflict_columns(&self) -> Vec<&TargetColumn> {
        self.columns
            .iter()
            .filter(|c| c.is_array() || self.mode == BackfillMode::FillNullOnly)
            .collect()
    }

    /// All inserted column names: key, backfill columns, then provenance columns
    pub fn insert_column_names(&self) -> Vec<&str> {
        let mut names = vec![self.key_column.as_str()];
        names.extend(self.columns.iter().map(|c| c.name.as_str()));
        names.extend(self.tracking.names());
        names
    }
}
