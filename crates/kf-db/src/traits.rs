//! Reference store trait definition

use crate::error::DbResult;
use kf_core::{DbType, ExistingProbe, ExistingRow, FactBatch, QualifiedTable};
use std::collections::HashMap;

/// Storage the backfill engine reads reference keys from and writes upserts to.
///
/// Calls block until the database answers; the engine has no internal async
/// scheduling. Implementations must be Send + Sync so independent domains can
/// run on separate threads.
pub trait ReferenceStore: Send + Sync {
    /// Execute one statement, returns affected rows
    fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple SQL statements
    fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Run an existence query built for `probe` and index the rows by key text.
    ///
    /// The query's columns are: key as text, one boolean per
    /// `probe.null_check_columns`, then one list per `probe.array_columns`.
    fn fetch_existing(
        &self,
        sql: &str,
        probe: &ExistingProbe,
    ) -> DbResult<HashMap<String, ExistingRow>>;

    /// Run a query and return its result as a fact batch
    fn load_facts(&self, sql: &str) -> DbResult<FactBatch>;

    /// Check if a table or view exists
    fn relation_exists(&self, table: &QualifiedTable) -> DbResult<bool>;

    /// Database type, selects the SQL dialect
    fn db_type(&self) -> DbType;
}
