//! Per-run reporting: what each foreign-key config inserted, updated or skipped.

use crate::reference::QualifiedTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a run writes to the reference tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Execute the generated statements
    #[default]
    Apply,
    /// Generate statements and counts without writing anything
    Plan,
}

/// Outcome of one foreign-key config within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Statement executed (or nothing needed writing)
    Applied,
    /// Statement generated in plan mode, not executed
    Planned,
    /// Reading or writing the reference table failed
    Failed,
    /// Not attempted because a prerequisite failed
    Blocked,
    /// The fact batch lacks this config's source column
    NoSourceColumn,
}

impl TableStatus {
    /// True when the config did not reach a terminal good state
    pub fn is_failure(&self) -> bool {
        matches!(self, TableStatus::Failed | TableStatus::Blocked)
    }
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TableStatus::Applied => "applied",
            TableStatus::Planned => "planned",
            TableStatus::Failed => "failed",
            TableStatus::Blocked => "blocked",
            TableStatus::NoSourceColumn => "no_source_column",
        };
        f.write_str(s)
    }
}

/// A per-group aggregation failure that fell back to the column default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Key of the affected group
    pub key: String,
    /// Target column whose value fell back
    pub column: String,
    /// Error message from the strategy
    pub message: String,
}

/// Counts and diagnostics for one foreign-key config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Foreign-key config name
    pub fk: String,

    /// Reference table written
    pub table: QualifiedTable,

    pub status: TableStatus,

    /// Keys absent from the reference table before the run
    pub inserted: usize,

    /// Existing rows that gained values
    pub updated: usize,

    /// Distinct keys seen that needed no write
    pub skipped: usize,

    /// Aggregation failures recovered by defaulting
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,

    /// Why the config failed or was blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Whether the failure is worth retrying (connectivity, write contention)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,

    /// Generated upsert statement, if any rows needed writing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
}

impl TableSummary {
    /// Empty summary with the given status
    pub fn new(fk: impl Into<String>, table: QualifiedTable, status: TableStatus) -> Self {
        Self {
            fk: fk.into(),
            table,
            status,
            inserted: 0,
            updated: 0,
            skipped: 0,
            errors: Vec::new(),
            message: None,
            retryable: false,
            statement: None,
        }
    }

    /// Summary for a config that failed with `message`
    pub fn failed(
        fk: impl Into<String>,
        table: QualifiedTable,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            message: Some(message.into()),
            retryable,
            ..Self::new(fk, table, TableStatus::Failed)
        }
    }

    /// Summary for a config skipped because `prerequisite` failed
    pub fn blocked(fk: impl Into<String>, table: QualifiedTable, prerequisite: &str) -> Self {
        Self {
            message: Some(format!("prerequisite '{prerequisite}' failed")),
            ..Self::new(fk, table, TableStatus::Blocked)
        }
    }
}

/// Result of running one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique identifier for this run
    pub run_id: String,

    pub domain: String,

    pub mode: RunMode,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// One entry per foreign-key config, in execution order
    pub tables: Vec<TableSummary>,
}

impl RunSummary {
    /// Start a new run
    pub fn new(domain: impl Into<String>, mode: RunMode) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string()[..8].to_string(),
            domain: domain.into(),
            mode,
            started_at: Utc::now(),
            finished_at: None,
            tables: Vec::new(),
        }
    }

    /// Record the end time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Look up the summary for one foreign-key config
    pub fn table(&self, fk: &str) -> Option<&TableSummary> {
        self.tables.iter().find(|t| t.fk == fk)
    }

    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.tables.iter().map(|t| t.updated).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.tables.iter().map(|t| t.skipped).sum()
    }

    /// Number of recovered per-group aggregation failures
    pub fn total_row_errors(&self) -> usize {
        self.tables.iter().map(|t| t.errors.len()).sum()
    }

    /// True when any config failed or was blocked
    pub fn has_failures(&self) -> bool {
        self.tables.iter().any(|t| t.status.is_failure())
    }

    /// True when the run failed and every failure is transient, so the
    /// surrounding pipeline may retry the whole pass
    pub fn is_retryable(&self) -> bool {
        let mut failed = self
            .tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .peekable();
        failed.peek().is_some() && failed.all(|t| t.retryable)
    }

    /// Elapsed time in milliseconds, once finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
