//! Hybrid reference coordinator: decides which reference keys are missing or
//! incomplete, derives rows for them from fact data, tags provenance and drives
//! the upsert executor, one foreign-key config at a time in dependency order.

use crate::aggregate::{group_rows, Aggregator, KeyGroup};
use crate::error::{EngineError, EngineResult};
use crate::executor::UpsertExecutor;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use kf_core::value::display_text;
use kf_core::{
    resolve_order, BackfillColumnMapping, BackfillMode, DomainConfig, ExistingProbe, ExistingRow,
    FactBatch, ForeignKeyConfig, Provenance, ReferenceRecord, RunMode, RunSummary, TableStatus,
    TableSummary, TargetColumn, TrackingColumns,
};
use kf_db::ReferenceStore;
use kf_expr::ExpressionEvaluator;
use kf_sql::{dialect_for, ReferenceTableDialect, UpsertStatement};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Maximum keys per existence query
pub const PROBE_CHUNK_SIZE: usize = 500;

/// Runs backfill passes for fact domains against one reference store.
///
/// Holds no state between runs; everything a run needs is passed in.
pub struct HybridReferenceCoordinator<'a> {
    store: &'a dyn ReferenceStore,
    dialect: Box<dyn ReferenceTableDialect>,
    evaluator: ExpressionEvaluator,
    tracking: TrackingColumns,
    retry: RetryPolicy,
}

impl<'a> HybridReferenceCoordinator<'a> {
    /// Coordinator using the dialect matching the store's database type
    pub fn new(store: &'a dyn ReferenceStore, tracking: TrackingColumns) -> Self {
        Self::with_dialect(store, dialect_for(store.db_type()), tracking)
    }

    pub fn with_dialect(
        store: &'a dyn ReferenceStore,
        dialect: Box<dyn ReferenceTableDialect>,
        tracking: TrackingColumns,
    ) -> Self {
        Self {
            store,
            dialect,
            evaluator: ExpressionEvaluator::new(),
            tracking,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the policy used when a pass hits a transient database error
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Backfill every foreign-key config of one domain from `batch`.
    ///
    /// Configuration problems are returned as errors before the store is
    /// touched. Failures after that are reported per config in the summary: a
    /// failed config halts everything that depends on it, directly or not,
    /// while unrelated configs still run.
    pub fn run(
        &self,
        domain: &str,
        config: &DomainConfig,
        batch: &FactBatch,
        mode: RunMode,
    ) -> EngineResult<RunSummary> {
        config.validate(domain, &self.evaluator, &self.tracking)?;
        let order = resolve_order(domain, &config.foreign_keys)?;

        log::info!(
            "Backfilling domain '{}': {} foreign keys, {} fact rows ({:?})",
            domain,
            order.len(),
            batch.num_rows(),
            mode
        );

        let mut summary = RunSummary::new(domain, mode);
        let derived_at = Utc::now();
        let mut halted: HashSet<&str> = HashSet::new();

        for fk in order {
            if let Some(dep) = fk.depends_on.iter().find(|d| halted.contains(d.as_str())) {
                log::warn!(
                    "Skipping '{}': prerequisite '{}' did not complete",
                    fk.name,
                    dep
                );
                halted.insert(fk.name.as_str());
                summary.tables.push(TableSummary::blocked(
                    fk.name.as_str(),
                    fk.qualified_table(),
                    dep.as_str(),
                ));
                continue;
            }

            let table = match self.backfill_with_retry(domain, fk, batch, mode, derived_at) {
                Ok(table) => table,
                Err(e) => {
                    log::error!(
                        "Backfill of '{}' into '{}' failed: {}",
                        fk.name,
                        fk.qualified_table(),
                        e
                    );
                    halted.insert(fk.name.as_str());
                    TableSummary::failed(
                        fk.name.as_str(),
                        fk.qualified_table(),
                        e.to_string(),
                        e.is_retryable(),
                    )
                }
            };
            summary.tables.push(table);
        }

        summary.finish();
        Ok(summary)
    }

    /// Run one config, starting over from the probe after a transient error.
    ///
    /// A failed statement wrote nothing, so a fresh probe sees whatever a
    /// concurrent writer committed in the meantime and the counts stay exact.
    fn backfill_with_retry(
        &self,
        domain: &str,
        fk: &ForeignKeyConfig,
        batch: &FactBatch,
        mode: RunMode,
        derived_at: DateTime<Utc>,
    ) -> EngineResult<TableSummary> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.backfill(domain, fk, batch, mode, derived_at) {
                Err(e) if e.is_retryable() && self.retry.should_retry(attempts) => {
                    let delay = self.retry.delay(attempts - 1);
                    log::warn!(
                        "Transient failure backfilling '{}' (attempt {}/{}), retrying in {:?}: {}",
                        fk.name,
                        attempts,
                        self.retry.max_attempts,
                        delay,
                        e
                    );
                    std::thread::sleep(delay);
                }
                outcome => return outcome,
            }
        }
    }

    /// Process one foreign-key config
    fn backfill(
        &self,
        domain: &str,
        fk: &ForeignKeyConfig,
        batch: &FactBatch,
        mode: RunMode,
        derived_at: DateTime<Utc>,
    ) -> EngineResult<TableSummary> {
        let table = fk.qualified_table();
        if !batch.has_column(&fk.source_column) {
            log::info!(
                "Fact batch has no column '{}', nothing to backfill for '{}'",
                fk.source_column,
                fk.name
            );
            return Ok(TableSummary::new(
                fk.name.as_str(),
                table,
                TableStatus::NoSourceColumn,
            ));
        }

        let mappings = active_mappings(fk, batch)?;
        let columns: Vec<TargetColumn> = mappings.iter().map(|m| m.target_column()).collect();
        let status = match mode {
            RunMode::Apply => TableStatus::Applied,
            RunMode::Plan => TableStatus::Planned,
        };
        let mut summary = TableSummary::new(fk.name.as_str(), table.clone(), status);

        let groups = group_rows(batch, fk);
        if groups.is_empty() {
            return Ok(summary);
        }

        let existing = self.probe_existing(fk, &columns, &groups)?;

        // Missing keys always need a row; present ones only if they may gain values
        let fill_nulls = fk.mode == BackfillMode::FillNullOnly;
        let has_arrays = columns.iter().any(TargetColumn::is_array);
        let candidates: Vec<&KeyGroup> = groups
            .iter()
            .filter(|g| match existing.get(&g.key_text) {
                None => true,
                Some(row) => has_arrays || (fill_nulls && !row.null_columns.is_empty()),
            })
            .collect();
        summary.skipped = groups.len() - candidates.len();

        let aggregated =
            Aggregator::new(domain, fk, &mappings, batch, &self.evaluator).aggregate(&candidates);
        summary.errors = aggregated.errors;

        let mut records: Vec<ReferenceRecord> = Vec::with_capacity(aggregated.records.len());
        for mut record in aggregated.records {
            match existing.get(&record.key_text) {
                None => summary.inserted += 1,
                Some(row) if enriches(row, &columns, &record, fill_nulls) => summary.updated += 1,
                Some(_) => {
                    summary.skipped += 1;
                    continue;
                }
            }
            record.provenance = Some(Provenance::auto_derived(domain, derived_at));
            records.push(record);
        }

        if records.is_empty() {
            log::info!(
                "'{}': all {} keys already present and complete",
                fk.name,
                summary.skipped
            );
            return Ok(summary);
        }

        let stmt = UpsertStatement {
            table,
            key_column: fk.target_key.clone(),
            columns,
            records,
            mode: fk.mode,
            tracking: self.tracking.clone(),
        };
        let execution =
            UpsertExecutor::new(self.store, self.dialect.as_ref()).execute(&stmt, mode)?;
        summary.statement = Some(execution.sql);

        log::info!(
            "'{}' -> {}: {} inserted, {} updated, {} skipped, {} row errors",
            fk.name,
            stmt.table,
            summary.inserted,
            summary.updated,
            summary.skipped,
            summary.errors.len()
        );
        Ok(summary)
    }

    /// What the reference table holds for the batch's keys
    fn probe_existing(
        &self,
        fk: &ForeignKeyConfig,
        columns: &[TargetColumn],
        groups: &[KeyGroup],
    ) -> EngineResult<HashMap<String, ExistingRow>> {
        let null_check_columns: Vec<String> = if fk.mode == BackfillMode::FillNullOnly {
            columns
                .iter()
                .filter(|c| !c.is_array())
                .map(|c| c.name.clone())
                .collect()
        } else {
            Vec::new()
        };
        let array_columns: Vec<String> = columns
            .iter()
            .filter(|c| c.is_array())
            .map(|c| c.name.clone())
            .collect();

        let mut existing = HashMap::with_capacity(groups.len());
        for chunk in groups.chunks(PROBE_CHUNK_SIZE) {
            let probe = ExistingProbe {
                table: fk.qualified_table(),
                key_column: fk.target_key.clone(),
                null_check_columns: null_check_columns.clone(),
                array_columns: array_columns.clone(),
                keys: chunk.iter().map(|g| g.key.clone()).collect(),
            };
            let sql = self.dialect.existing_key_query(&probe);
            existing.extend(self.store.fetch_existing(&sql, &probe)?);
        }
        log::debug!(
            "'{}': {} of {} keys already present in {}",
            fk.name,
            existing.len(),
            groups.len(),
            fk.qualified_table()
        );
        Ok(existing)
    }
}

/// Mappings whose fact columns are all present.
///
/// An optional mapping with absent columns is dropped for this run; a
/// required one fails the config.
fn active_mappings<'c>(
    fk: &'c ForeignKeyConfig,
    batch: &FactBatch,
) -> EngineResult<Vec<&'c BackfillColumnMapping>> {
    let mut active = Vec::with_capacity(fk.backfill_columns.len());
    for mapping in &fk.backfill_columns {
        let missing = mapping
            .required_fact_columns()
            .into_iter()
            .find(|c| !batch.has_column(c));
        match missing {
            None => active.push(mapping),
            Some(column) if mapping.optional => {
                log::debug!(
                    "Dropping optional column '{}' of '{}': fact batch has no '{}'",
                    mapping.target,
                    fk.name,
                    column
                );
            }
            Some(column) => {
                return Err(EngineError::MissingFactColumn {
                    fk: fk.name.to_string(),
                    target: mapping.target.clone(),
                    column: column.to_string(),
                })
            }
        }
    }
    Ok(active)
}

/// Whether upserting `record` would change the stored row
fn enriches(
    row: &ExistingRow,
    columns: &[TargetColumn],
    record: &ReferenceRecord,
    fill_nulls: bool,
) -> bool {
    columns.iter().zip(&record.values).any(|(column, value)| {
        if column.is_array() {
            // a null array is raised to the empty floor even when nothing is added
            if row.null_arrays.contains(&column.name) {
                return true;
            }
            let stored: HashSet<String> = row
                .arrays
                .get(&column.name)
                .map(|items| items.iter().map(display_text).collect())
                .unwrap_or_default();
            array_items(value)
                .iter()
                .any(|item| !stored.contains(&display_text(item)))
        } else {
            fill_nulls && row.null_columns.contains(&column.name) && !value.is_null()
        }
    })
}

fn array_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
