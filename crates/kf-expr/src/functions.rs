//! Helper filters and functions registered in the expression environment:
//! `pluck()`, `non_blank()`, `distinct()` and `fail()`.

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};

/// Project one column out of a list of row maps.
///
/// Usage:
/// ```jinja
/// rows | pluck("tag")
/// ```
pub(crate) fn pluck(rows: Vec<Value>, column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| match row.get_attr(column) {
            Ok(v) if !v.is_undefined() => v,
            _ => Value::from(()),
        })
        .collect()
}

/// Drop `none` values and strings that are empty after trimming.
pub(crate) fn non_blank(values: Vec<Value>) -> Vec<Value> {
    values.into_iter().filter(|v| !is_blank(v)).collect()
}

/// Remove duplicates while keeping first-occurrence order.
pub(crate) fn distinct(values: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(values.len());
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Abort evaluation of the current group with a message.
///
/// Usage:
/// ```jinja
/// fail("unexpected plan type") if rows | length > 100 else rows | pluck("x")
/// ```
pub(crate) fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

fn is_blank(v: &Value) -> bool {
    if v.is_undefined() || v.is_none() {
        return true;
    }
    v.as_str().is_some_and(|s| s.trim().is_empty())
}
