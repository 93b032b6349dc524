//! Aggregation engine: reduces the fact rows sharing one foreign-key value to a
//! single value per backfill column.

use kf_core::value::{compare_values, display_text, is_blank, key_text, normalize_key};
use kf_core::{
    AggregationConfig, BackfillColumnMapping, FactBatch, ForeignKeyConfig, ReferenceRecord,
    RowError,
};
use kf_expr::ExpressionEvaluator;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Fact rows sharing one key value, in batch order
#[derive(Debug, Clone, PartialEq)]
pub struct KeyGroup {
    /// Key as it first appeared in the batch, integral floats as integers
    pub key: Value,
    pub key_text: String,
    /// Row indices into the batch
    pub rows: Vec<usize>,
}

/// Group batch rows by the config's source column.
///
/// Groups come out in first-seen order. Null keys never form a group; blank
/// keys are dropped too when `skip_blank_values` is set. An absent source
/// column yields no groups.
pub fn group_rows(batch: &FactBatch, fk: &ForeignKeyConfig) -> Vec<KeyGroup> {
    let Some(keys) = batch.column(&fk.source_column) else {
        return Vec::new();
    };

    let mut groups: Vec<KeyGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (row, value) in keys.iter().enumerate() {
        if fk.skip_blank_values && is_blank(value) {
            continue;
        }
        let Some(text) = key_text(value) else {
            continue;
        };
        match index.get(&text) {
            Some(&g) => groups[g].rows.push(row),
            None => {
                index.insert(text.clone(), groups.len());
                groups.push(KeyGroup {
                    key: normalize_key(value),
                    key_text: text,
                    rows: vec![row],
                });
            }
        }
    }
    groups
}

/// Candidate records plus the per-group failures recovered along the way
#[derive(Debug, Default)]
pub struct Aggregated {
    pub records: Vec<ReferenceRecord>,
    pub errors: Vec<RowError>,
}

/// Computes backfill column values for one foreign-key config over one batch.
pub struct Aggregator<'a> {
    domain: &'a str,
    fk: &'a ForeignKeyConfig,
    mappings: &'a [&'a BackfillColumnMapping],
    batch: &'a FactBatch,
    evaluator: &'a ExpressionEvaluator,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        domain: &'a str,
        fk: &'a ForeignKeyConfig,
        mappings: &'a [&'a BackfillColumnMapping],
        batch: &'a FactBatch,
        evaluator: &'a ExpressionEvaluator,
    ) -> Self {
        Self {
            domain,
            fk,
            mappings,
            batch,
            evaluator,
        }
    }

    /// One record per group, values aligned with `mappings`.
    ///
    /// A strategy failing for one group degrades that group's value to the
    /// strategy default (empty array or null) and is reported in `errors`;
    /// other groups are unaffected.
    pub fn aggregate(&self, groups: &[&KeyGroup]) -> Aggregated {
        let needs_rows = self.mappings.iter().any(|m| m.aggregation.code().is_some());
        let columns: Vec<&str> = self
            .batch
            .column_names()
            .iter()
            .map(String::as_str)
            .collect();

        let mut out = Aggregated::default();
        for group in groups {
            let rows: Vec<Map<String, Value>> = if needs_rows {
                group
                    .rows
                    .iter()
                    .map(|&r| self.batch.row_map(r, &columns))
                    .collect()
            } else {
                Vec::new()
            };

            let mut values = Vec::with_capacity(self.mappings.len());
            for mapping in self.mappings {
                match self.column_value(mapping, group, &rows) {
                    Ok(value) => values.push(value),
                    Err(message) => {
                        log::warn!(
                            "Aggregation failed, using default: domain='{}' fk='{}' key='{}' \
                             column='{}' strategy='{}': {}",
                            self.domain,
                            self.fk.name,
                            group.key_text,
                            mapping.target,
                            mapping.aggregation.strategy_name(),
                            message
                        );
                        out.errors.push(RowError {
                            key: group.key_text.clone(),
                            column: mapping.target.clone(),
                            message,
                        });
                        values.push(fallback(&mapping.aggregation));
                    }
                }
            }

            out.records.push(ReferenceRecord {
                key: group.key.clone(),
                key_text: group.key_text.clone(),
                values,
                provenance: None,
            });
        }
        out
    }

    fn column_value(
        &self,
        mapping: &BackfillColumnMapping,
        group: &KeyGroup,
        rows: &[Map<String, Value>],
    ) -> Result<Value, String> {
        let source = mapping.source.as_deref().unwrap_or_default();
        let value = match &mapping.aggregation {
            AggregationConfig::First => self.first(source, group),
            AggregationConfig::MaxBy { order_column } => self.max_by(source, order_column, group),
            AggregationConfig::ConcatDistinct { separator, sort } => {
                let mut texts = self.distinct_texts(source, group);
                if *sort {
                    collate(&mut texts);
                }
                if texts.is_empty() {
                    Value::Null
                } else {
                    Value::String(texts.join(separator))
                }
            }
            AggregationConfig::CountDistinct => {
                Value::from(self.distinct_texts(source, group).len() as u64)
            }
            AggregationConfig::Template { text } => Value::String(text.clone()),
            AggregationConfig::Lambda { code } => self
                .evaluator
                .evaluate_scalar(code, &group.key, rows)
                .map_err(|e| e.to_string())?,
            AggregationConfig::JsonbAppend { code } => self
                .evaluator
                .evaluate_sequence(code, &group.key, rows)
                .map(|items| Value::Array(distinct_items(items)))
                .map_err(|e| e.to_string())?,
        };
        Ok(value)
    }

    /// Source values of a group, skipping blanks when the config says so
    fn source_values<'g>(
        &'g self,
        source: &'g str,
        group: &'g KeyGroup,
    ) -> impl Iterator<Item = (usize, &'g Value)> + 'g {
        group.rows.iter().filter_map(move |&row| {
            let value = self.batch.value(source, row)?;
            if self.fk.skip_blank_values && is_blank(value) {
                None
            } else {
                Some((row, value))
            }
        })
    }

    fn first(&self, source: &str, group: &KeyGroup) -> Value {
        self.source_values(source, group)
            .next()
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    }

    /// Value from the row with the greatest order value; the earliest row wins ties
    fn max_by(&self, source: &str, order_column: &str, group: &KeyGroup) -> Value {
        let mut best: Option<(&Value, &Value)> = None;
        for (row, value) in self.source_values(source, group) {
            let order = self.batch.value(order_column, row).unwrap_or(&Value::Null);
            let better = match best {
                None => true,
                Some((_, best_order)) => compare_values(order, best_order) == Ordering::Greater,
            };
            if better {
                best = Some((value, order));
            }
        }
        best.map(|(v, _)| v.clone()).unwrap_or(Value::Null)
    }

    /// Distinct non-blank values as text, in first-seen order
    fn distinct_texts(&self, source: &str, group: &KeyGroup) -> Vec<String> {
        let mut seen = HashSet::new();
        group
            .rows
            .iter()
            .filter_map(|&row| self.batch.value(source, row))
            .filter(|v| !is_blank(v))
            .map(display_text)
            .filter(|text| seen.insert(text.clone()))
            .collect()
    }
}

/// Value used when a strategy fails for a group
fn fallback(aggregation: &AggregationConfig) -> Value {
    if aggregation.is_array_merge() {
        Value::Array(Vec::new())
    } else {
        Value::Null
    }
}

/// Sort text values by their GB18030 encoding.
///
/// ASCII sorts bytewise and common Chinese characters sort in pinyin order,
/// which is how the reference data is read by the people reviewing it.
fn collate(values: &mut [String]) {
    values.sort_by_cached_key(|v| encoding_rs::GB18030.encode(v).0.into_owned());
}

/// Drop nulls and repeated elements, keeping the first occurrence
fn distinct_items(items: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|v| !v.is_null() && seen.insert(display_text(v)))
        .collect()
}

#[cfg(test)]
#[path = "aggregate_test.rs"]
mod tests;
