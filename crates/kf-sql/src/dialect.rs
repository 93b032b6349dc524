//! Reference-table dialects: product-specific SQL for upserts, null-guarded
//! updates and array merges.

use chrono::{DateTime, Utc};
use kf_core::value::display_text;
use kf_core::{DbType, ExistingProbe, QualifiedTable, ReferenceRecord};
use serde_json::Value;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect, DuckDbDialect as SqlParserDuckDb, PostgreSqlDialect as SqlParserPostgres,
};
use sqlparser::parser::Parser;

use crate::error::{SqlError, SqlResult};
use crate::quote::{quote_ident, quote_string};
use crate::upsert::UpsertStatement;

/// Builds the SQL the engine sends to one database product.
///
/// Implementations supply the array handling; everything else has a default
/// that both supported products accept.
pub trait ReferenceTableDialect: Send + Sync {
    /// Dialect name
    fn name(&self) -> &'static str;

    /// Underlying sqlparser dialect, used to validate generated statements
    fn parser_dialect(&self) -> &dyn Dialect;

    /// Quote an identifier for this dialect
    fn quote_ident(&self, ident: &str) -> String {
        quote_ident(ident)
    }

    /// Quoted, optionally schema-qualified table name
    fn qualified_table(&self, table: &QualifiedTable) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(&table.table)
            ),
            None => self.quote_ident(&table.table),
        }
    }

    /// Target of `INSERT INTO`, including any alias the conflict clause refers to
    fn insert_target(&self, table: &QualifiedTable) -> String {
        self.qualified_table(table)
    }

    /// Reference to a column of the row already stored, inside `DO UPDATE`
    fn existing_column(&self, column: &str) -> String {
        self.quote_ident(column)
    }

    /// Reference to a column of the proposed row, inside `DO UPDATE`
    fn excluded_column(&self, column: &str) -> String {
        format!("excluded.{}", self.quote_ident(column))
    }

    /// Render a scalar cell value as a SQL literal
    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => quote_string(s),
            // nested values land in text columns as JSON
            other => quote_string(&other.to_string()),
        }
    }

    /// Render an array column value
    fn render_array(&self, values: &[Value]) -> String;

    /// Render a UTC timestamp literal
    fn render_timestamp(&self, ts: &DateTime<Utc>) -> String {
        format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f"))
    }

    /// `SET` clause keeping a non-null stored value and filling a null one
    fn null_guarded_update(&self, column: &str) -> String {
        format!(
            "{} = COALESCE({}, {})",
            self.quote_ident(column),
            self.existing_column(column),
            self.excluded_column(column)
        )
    }

    /// `SET` clause replacing an array with the deduplicated union of the stored
    /// and proposed arrays, null read as empty
    fn array_merge(&self, column: &str) -> String;

    /// Query returning, per requested key: the key as text, one null flag per
    /// probed scalar column, then each probed array column
    fn existing_key_query(&self, probe: &ExistingProbe) -> String {
        let key = format!("CAST({} AS VARCHAR)", self.quote_ident(&probe.key_column));
        let mut select = vec![key.clone()];
        select.extend(
            probe
                .null_check_columns
                .iter()
                .map(|c| format!("({} IS NULL)", self.quote_ident(c))),
        );
        select.extend(probe.array_columns.iter().map(|c| self.quote_ident(c)));

        let keys = probe
            .keys
            .iter()
            .map(|k| quote_string(&display_text(k)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            select.join(", "),
            self.qualified_table(&probe.table),
            key,
            keys
        )
    }

    /// One `VALUES` tuple
    fn render_row(&self, stmt: &UpsertStatement, record: &ReferenceRecord) -> String {
        let mut cells = vec![self.render_literal(&record.key)];
        for (column, value) in stmt.columns.iter().zip(&record.values) {
            if column.is_array() {
                cells.push(match value {
                    Value::Array(items) => self.render_array(items),
                    Value::Null => self.render_array(&[]),
                    single => self.render_array(std::slice::from_ref(single)),
                });
            } else {
                cells.push(self.render_literal(value));
            }
        }
        if stmt.tracking.enabled {
            match &record.provenance {
                Some(p) => {
                    cells.push(quote_string(p.source.as_str()));
                    cells.push(self.render_literal(&Value::Bool(p.needs_review)));
                    cells.push(quote_string(&p.derived_from_domain));
                    cells.push(self.render_timestamp(&p.derived_at));
                }
                None => cells.extend(std::iter::repeat("NULL".to_string()).take(4)),
            }
        }
        format!("({})", cells.join(", "))
    }

    /// The single batched insert-or-merge statement for one table
    fn build_upsert(&self, stmt: &UpsertStatement) -> SqlResult<String> {
        stmt.validate()?;

        let columns = stmt
            .insert_column_names()
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = stmt
            .records
            .iter()
            .map(|r| self.render_row(stmt, r))
            .collect::<Vec<_>>()
            .join(",\n  ");

        let updates: Vec<String> = stmt
            .conflict_columns()
            .into_iter()
            .map(|c| {
                if c.is_array() {
                    self.array_merge(&c.name)
                } else {
                    self.null_guarded_update(&c.name)
                }
            })
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        log::debug!(
            "Built {} upsert for '{}': {} rows, {} merged on conflict",
            self.name(),
            stmt.table,
            stmt.records.len(),
            updates.len()
        );

        Ok(format!(
            "INSERT INTO {} ({})\nVALUES\n  {}\nON CONFLICT ({}) {}",
            self.insert_target(&stmt.table),
            columns,
            rows,
            self.quote_ident(&stmt.key_column),
            action
        ))
    }

    /// Parse SQL into AST statements
    fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        if sql.trim().is_empty() {
            return Err(SqlError::EmptySql);
        }
        Parser::parse_sql(self.parser_dialect(), sql).map_err(|e| {
            let msg = e.to_string();
            let (line, column) = parse_location_from_error(&msg);
            SqlError::ParseError {
                message: msg,
                line,
                column,
            }
        })
    }

    /// Check that generated text is exactly one parseable statement
    fn validate_statement(&self, sql: &str) -> SqlResult<()> {
        match self.parse(sql)?.len() {
            1 => Ok(()),
            n => Err(SqlError::StatementCount(n)),
        }
    }
}

/// Pull "Line: N, Column: M" out of a sqlparser error message.
fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let number_after = |label: &str| -> Option<usize> {
        let start = msg.find(label)? + label.len();
        let rest = &msg[start..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        rest[..end].parse().ok()
    };
    match (number_after("Line: "), number_after("Column: ")) {
        (Some(line), Some(column)) => (line, column),
        _ => (0, 0),
    }
}

/// DuckDB: arrays are `VARCHAR[]` lists
pub struct DuckDbDialect {
    dialect: SqlParserDuckDb,
}

impl DuckDbDialect {
    /// Create a new DuckDB dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserDuckDb {},
        }
    }
}

impl Default for DuckDbDialect {
    fn default() -> Self {
        Self::new()
    }
}

const DUCKDB_EMPTY_LIST: &str = "[]::VARCHAR[]";

impl ReferenceTableDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn render_array(&self, values: &[Value]) -> String {
        let items: Vec<String> = values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| quote_string(&display_text(v)))
            .collect();
        if items.is_empty() {
            DUCKDB_EMPTY_LIST.to_string()
        } else {
            format!("[{}]::VARCHAR[]", items.join(", "))
        }
    }

    fn array_merge(&self, column: &str) -> String {
        format!(
            "{} = list_distinct(list_concat(COALESCE({}, {empty}), COALESCE({}, {empty})))",
            self.quote_ident(column),
            self.existing_column(column),
            self.excluded_column(column),
            empty = DUCKDB_EMPTY_LIST
        )
    }
}

/// PostgreSQL: arrays are `jsonb` documents
pub struct PostgresDialect {
    dialect: SqlParserPostgres,
}

impl PostgresDialect {
    /// Create a new PostgreSQL dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserPostgres {},
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

/// Alias given to the target table so `DO UPDATE` can name stored columns
const PG_TARGET_ALIAS: &str = "t";

impl ReferenceTableDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn insert_target(&self, table: &QualifiedTable) -> String {
        format!("{} AS {}", self.qualified_table(table), PG_TARGET_ALIAS)
    }

    fn existing_column(&self, column: &str) -> String {
        format!("{}.{}", PG_TARGET_ALIAS, self.quote_ident(column))
    }

    fn excluded_column(&self, column: &str) -> String {
        format!("EXCLUDED.{}", self.quote_ident(column))
    }

    fn render_timestamp(&self, ts: &DateTime<Utc>) -> String {
        format!("TIMESTAMPTZ '{}+00'", ts.format("%Y-%m-%d %H:%M:%S%.6f"))
    }

    fn render_array(&self, values: &[Value]) -> String {
        let items: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
        format!("{}::jsonb", quote_string(&Value::Array(items).to_string()))
    }

    fn array_merge(&self, column: &str) -> String {
        format!(
            "{} = (SELECT COALESCE(jsonb_agg(DISTINCT e), '[]'::jsonb) \
             FROM jsonb_array_elements(\
             COALESCE({}, '[]'::jsonb) || COALESCE({}, '[]'::jsonb)) AS e)",
            self.quote_ident(column),
            self.existing_column(column),
            self.excluded_column(column)
        )
    }
}

/// Dialect for a configured database type
pub fn dialect_for(db_type: DbType) -> Box<dyn ReferenceTableDialect> {
    match db_type {
        DbType::DuckDb => Box::new(DuckDbDialect::new()),
        DbType::Postgres => Box::new(PostgresDialect::new()),
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
