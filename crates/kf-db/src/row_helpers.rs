//! Shared helpers for reading DuckDB row columns as JSON cell values.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, Duration, NaiveDate};
use duckdb::types::{TimeUnit, Value as DuckValue};
use serde_json::{Number, Value};

/// Convert a DuckDB value into the engine's cell representation.
///
/// Integers and floats become JSON numbers, dates and timestamps become ISO
/// text, lists become arrays. Types with no natural JSON form fall back to
/// their debug text.
pub(crate) fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(n) => Value::from(n),
        DuckValue::SmallInt(n) => Value::from(n),
        DuckValue::Int(n) => Value::from(n),
        DuckValue::BigInt(n) => Value::from(n),
        DuckValue::HugeInt(n) => match i64::try_from(n) {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(n.to_string()),
        },
        DuckValue::UTinyInt(n) => Value::from(n),
        DuckValue::USmallInt(n) => Value::from(n),
        DuckValue::UInt(n) => Value::from(n),
        DuckValue::UBigInt(n) => Value::from(n),
        DuckValue::Float(f) => float(f64::from(f)),
        DuckValue::Double(f) => float(f),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::String(s),
        DuckValue::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(i64::from(days))))
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        DuckValue::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null)
        }
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Read one column of a row as a JSON cell value.
pub(crate) fn get_cell(row: &duckdb::Row<'_>, idx: usize) -> duckdb::Result<Value> {
    row.get::<_, DuckValue>(idx).map(to_json)
}

/// Execute a prepared statement and collect every row as JSON cells.
///
/// DuckDB panics on `stmt.column_count()` before execution, so rows are
/// collected via `query_map` first and the column names read afterwards.
///
/// Returns `(column_names, rows)`.
pub(crate) fn execute_and_collect(
    stmt: &mut duckdb::Statement,
) -> DbResult<(Vec<String>, Vec<Vec<Value>>)> {
    let rows: Vec<Vec<Value>> = stmt
        .query_map([], |row| {
            let col_count = row.as_ref().column_count();
            (0..col_count).map(|i| get_cell(row, i)).collect()
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let column_count = stmt.column_count();
    let names = (0..column_count)
        .map(|i| {
            stmt.column_name(i)
                .map(|name| name.to_string())
                .map_err(|e| DbError::UnexpectedResult(format!("column {i}: {e}")))
        })
        .collect::<DbResult<Vec<_>>>()?;

    Ok((names, rows))
}
