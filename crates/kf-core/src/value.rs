//! Helpers for the JSON cell values carried by fact batches and reference records.

use serde_json::Value;
use std::cmp::Ordering;

/// A cell is blank when it is null or a string that is empty after trimming.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Largest magnitude at which every integer is exactly representable in f64
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Canonical form of a key value.
///
/// Integral floats become integers, so a `7.0` read from a DOUBLE fact column
/// matches the `7` an integer key column casts to.
pub fn normalize_key(value: &Value) -> Value {
    if let Value::Number(n) = value {
        if !n.is_i64() && !n.is_u64() {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() <= MAX_EXACT_F64_INT {
                    return Value::from(f as i64);
                }
            }
        }
    }
    value.clone()
}

/// Text form used for grouping and key comparison.
///
/// Returns `None` for null: a null can never identify a reference row.
pub fn key_text(value: &Value) -> Option<String> {
    match normalize_key(value) {
        Value::Null => None,
        other => Some(display_text(&other)),
    }
}

/// Plain text rendering: strings without quotes, everything else as JSON.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Total order over cell values used by `max_by`.
///
/// Null sorts lowest. Two numeric-looking values (numbers or strings that
/// parse as numbers) compare numerically; anything else compares by text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => display_text(a).cmp(&display_text(b)),
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) => None,
        _ => None,
    }
}
