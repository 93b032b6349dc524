//! DuckDB reference store implementation

use crate::error::{DbError, DbResult};
use crate::row_helpers::{execute_and_collect, get_cell};
use crate::traits::ReferenceStore;
use duckdb::Connection;
use kf_core::{DbType, ExistingProbe, ExistingRow, FactBatch, QualifiedTable};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB reference store
#[derive(Debug)]
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open another connection to the same database.
    ///
    /// Each concurrently running domain gets its own connection; DuckDB
    /// arbitrates between them.
    pub fn try_clone(&self) -> DbResult<Self> {
        let conn = self
            .lock()?
            .try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }
}

impl ReferenceStore for DuckDbStore {
    fn execute(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        log::debug!("Executing: {}", sql);
        Ok(conn.execute(sql, [])?)
    }

    fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        Ok(conn.execute_batch(sql)?)
    }

    fn fetch_existing(
        &self,
        sql: &str,
        probe: &ExistingProbe,
    ) -> DbResult<HashMap<String, ExistingRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let flags = probe.null_check_columns.len();
        let expected = 1 + flags + probe.array_columns.len();

        let rows = stmt
            .query_map([], |row| {
                let key: Option<String> = row.get(0)?;
                let mut null_columns = HashSet::new();
                for (i, column) in probe.null_check_columns.iter().enumerate() {
                    if row.get::<_, Option<bool>>(1 + i)?.unwrap_or(false) {
                        null_columns.insert(column.clone());
                    }
                }
                let mut arrays = HashMap::new();
                let mut null_arrays = HashSet::new();
                for (i, column) in probe.array_columns.iter().enumerate() {
                    let items = match get_cell(row, 1 + flags + i)? {
                        Value::Array(items) => items,
                        Value::Null => {
                            null_arrays.insert(column.clone());
                            Vec::new()
                        }
                        _ => Vec::new(),
                    };
                    arrays.insert(column.clone(), items);
                }
                Ok((
                    key,
                    row.as_ref().column_count(),
                    ExistingRow {
                        null_columns,
                        arrays,
                        null_arrays,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut existing = HashMap::with_capacity(rows.len());
        for (key, width, row) in rows {
            if width != expected {
                return Err(DbError::UnexpectedResult(format!(
                    "existence query returned {width} columns, expected {expected}"
                )));
            }
            if let Some(key) = key {
                existing.insert(key, row);
            }
        }
        Ok(existing)
    }

    fn load_facts(&self, sql: &str) -> DbResult<FactBatch> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let (names, rows) = execute_and_collect(&mut stmt)?;

        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for row in rows {
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        FactBatch::from_columns(names.into_iter().zip(columns))
            .map_err(|e| DbError::UnexpectedResult(e.to_string()))
    }

    fn relation_exists(&self, table: &QualifiedTable) -> DbResult<bool> {
        let conn = self.lock()?;
        let schema = table.schema.as_deref().unwrap_or("main");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ?",
            [schema, table.table.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn db_type(&self) -> DbType {
        DbType::DuckDb
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
