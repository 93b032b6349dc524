//! Expression environment used by the `lambda` and `jsonb_append` strategies

use crate::error::{ExprError, ExprResult};
use crate::functions::{distinct, fail, non_blank, pluck};
use minijinja::value::{Value, ValueKind};
use minijinja::{context, Environment};
use serde_json::{Map, Value as JsonValue};

/// Compiles and evaluates aggregation expressions over a group of rows.
///
/// The evaluator is cheap to share by reference; compiled expressions are not
/// cached because the environment borrows each source string per call.
pub struct ExpressionEvaluator {
    env: Environment<'static>,
}

impl ExpressionEvaluator {
    /// Create an evaluator with the Keyfill helper filters registered
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("pluck", pluck);
        env.add_filter("non_blank", non_blank);
        env.add_filter("distinct", distinct);
        env.add_function("fail", fail);
        Self { env }
    }

    /// Check that an expression parses. Used at configuration load time.
    pub fn check(&self, source: &str) -> ExprResult<()> {
        if source.trim().is_empty() {
            return Err(ExprError::Syntax("expression is empty".to_string()));
        }
        self.env
            .compile_expression(source)
            .map(|_| ())
            .map_err(|e| ExprError::Syntax(e.to_string()))
    }

    /// Evaluate an expression that must produce a scalar.
    ///
    /// `none` and undefined results map to JSON `null`.
    pub fn evaluate_scalar(
        &self,
        source: &str,
        key: &JsonValue,
        rows: &[Map<String, JsonValue>],
    ) -> ExprResult<JsonValue> {
        let value = self.eval(source, key, rows)?;
        match value.kind() {
            ValueKind::Undefined | ValueKind::None => Ok(JsonValue::Null),
            ValueKind::Seq | ValueKind::Map | ValueKind::Iterable | ValueKind::Plain => {
                Err(ExprError::NonScalar {
                    kind: value.kind().to_string(),
                })
            }
            _ => to_json(&value),
        }
    }

    /// Evaluate an expression whose result is appended to an array column.
    ///
    /// A missing result becomes an empty sequence and a non-sequence result is
    /// wrapped into a one-element sequence.
    pub fn evaluate_sequence(
        &self,
        source: &str,
        key: &JsonValue,
        rows: &[Map<String, JsonValue>],
    ) -> ExprResult<Vec<JsonValue>> {
        let value = self.eval(source, key, rows)?;
        match value.kind() {
            ValueKind::Undefined | ValueKind::None => Ok(Vec::new()),
            ValueKind::Seq | ValueKind::Iterable => {
                let iter = value
                    .try_iter()
                    .map_err(|e| ExprError::Evaluation(e.to_string()))?;
                iter.filter(|item| !item.is_undefined())
                    .map(|item| to_json(&item))
                    .collect()
            }
            _ => Ok(vec![to_json(&value)?]),
        }
    }

    fn eval(
        &self,
        source: &str,
        key: &JsonValue,
        rows: &[Map<String, JsonValue>],
    ) -> ExprResult<Value> {
        let expr = self
            .env
            .compile_expression(source)
            .map_err(|e| ExprError::Syntax(e.to_string()))?;
        expr.eval(context! {
            rows => Value::from_serialize(rows),
            key => Value::from_serialize(key),
        })
        .map_err(|e| ExprError::Evaluation(e.to_string()))
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn to_json(value: &Value) -> ExprResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| ExprError::Serialization(e.to_string()))
}

#[cfg(test)]
#[path = "evaluator_test.rs"]
mod tests;
