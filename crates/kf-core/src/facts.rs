//! Column-oriented batch of fact rows handed to the backfill engine.

use crate::error::{CoreError, CoreResult};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A tabular batch of fact rows stored column by column.
///
/// The schema is arbitrary; the engine only reads the columns the domain's
/// foreign-key configs reference.
#[derive(Debug, Clone, Default)]
pub struct FactBatch {
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl FactBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from `(name, values)` pairs. All columns must have the same length.
    pub fn from_columns<I, S>(columns: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let mut batch = Self::new();
        for (name, values) in columns {
            batch.push_column(name, values)?;
        }
        Ok(batch)
    }

    /// Build a batch from row maps. Columns missing from a row are filled with null.
    pub fn from_rows(rows: &[Map<String, Value>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        for row in rows {
            for name in row.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }

        let mut batch = Self::new();
        for name in names {
            let values = rows
                .iter()
                .map(|row| row.get(&name).cloned().unwrap_or(Value::Null))
                .collect();
            batch.insert_unchecked(name, values);
        }
        batch.rows = rows.len();
        batch
    }

    /// Append a column. Replaces an existing column of the same name.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> CoreResult<()> {
        let name = name.into();
        let replaces_only_column = self.names.len() == 1 && self.index.contains_key(&name);
        if !self.names.is_empty() && !replaces_only_column && values.len() != self.rows {
            return Err(CoreError::ColumnLengthMismatch {
                column: name,
                expected: self.rows,
                actual: values.len(),
            });
        }
        self.rows = values.len();
        self.insert_unchecked(name, values);
        Ok(())
    }

    fn insert_unchecked(&mut self, name: String, values: Vec<Value>) {
        match self.index.get(&name) {
            Some(&idx) => self.columns[idx] = values,
            None => {
                self.index.insert(name.clone(), self.names.len());
                self.names.push(name);
                self.columns.push(values);
            }
        }
    }

    /// Number of rows in the batch
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// True when the batch holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Check whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Borrow a column's values
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.index.get(name).map(|&idx| self.columns[idx].as_slice())
    }

    /// Get a single cell; `None` if the column is absent or the row is out of range
    pub fn value(&self, column: &str, row: usize) -> Option<&Value> {
        self.column(column).and_then(|values| values.get(row))
    }

    /// Materialize one row as a map over the given columns (absent columns are skipped)
    pub fn row_map(&self, row: usize, columns: &[&str]) -> Map<String, Value> {
        columns
            .iter()
            .filter_map(|name| {
                self.value(name, row)
                    .map(|v| ((*name).to_string(), v.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "facts_test.rs"]
mod tests;
