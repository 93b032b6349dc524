//! Upsert/merge executor: renders and runs the one statement per reference
//! table per run.

use crate::error::EngineResult;
use kf_core::RunMode;
use kf_db::ReferenceStore;
use kf_sql::{ReferenceTableDialect, UpsertStatement};

/// What happened to one upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Generated statement text
    pub sql: String,
    /// Rows the database reported as affected; `None` in plan mode
    pub affected: Option<usize>,
}

/// Renders upserts with a dialect and sends them to a store.
///
/// The statement is the atomicity boundary: the database either applies every
/// row of it or none.
pub struct UpsertExecutor<'a> {
    store: &'a dyn ReferenceStore,
    dialect: &'a dyn ReferenceTableDialect,
}

impl<'a> UpsertExecutor<'a> {
    pub fn new(store: &'a dyn ReferenceStore, dialect: &'a dyn ReferenceTableDialect) -> Self {
        Self { store, dialect }
    }

    /// Render `stmt` and, in apply mode, execute it.
    ///
    /// Plan mode never writes; it parses the statement instead and logs
    /// anything the parser rejects.
    pub fn execute(&self, stmt: &UpsertStatement, mode: RunMode) -> EngineResult<Execution> {
        let sql = self.dialect.build_upsert(stmt)?;

        match mode {
            RunMode::Plan => {
                if let Err(e) = self.dialect.validate_statement(&sql) {
                    log::warn!(
                        "Generated {} upsert for '{}' did not parse: {}",
                        self.dialect.name(),
                        stmt.table,
                        e
                    );
                }
                Ok(Execution {
                    sql,
                    affected: None,
                })
            }
            RunMode::Apply => {
                let affected = self.store.execute(&sql)?;
                log::debug!(
                    "Upserted {} rows into '{}' ({} affected)",
                    stmt.records.len(),
                    stmt.table,
                    affected
                );
                Ok(Execution {
                    sql,
                    affected: Some(affected),
                })
            }
        }
    }
}
