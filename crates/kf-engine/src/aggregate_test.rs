use super::*;
use serde_json::json;

fn batch(rows: Value) -> FactBatch {
    let rows: Vec<Map<String, Value>> = serde_json::from_value(rows).unwrap();
    FactBatch::from_rows(&rows)
}

fn fk(yaml: &str) -> ForeignKeyConfig {
    serde_yaml::from_str(yaml).unwrap()
}

fn run(fk: &ForeignKeyConfig, batch: &FactBatch) -> Aggregated {
    let evaluator = ExpressionEvaluator::new();
    let mappings: Vec<&BackfillColumnMapping> = fk.backfill_columns.iter().collect();
    let groups = group_rows(batch, fk);
    let refs: Vec<&KeyGroup> = groups.iter().collect();
    Aggregator::new("annuity", fk, &mappings, batch, &evaluator).aggregate(&refs)
}

fn value_of<'r>(out: &'r Aggregated, key: &str, column: usize) -> &'r Value {
    &out
        .records
        .iter()
        .find(|r| r.key_text == key)
        .unwrap()
        .values[column]
}

#[test]
fn test_max_by_tie_keeps_first_occurrence() {
    let fk = fk(r#"
name: company
source_column: company
target_table: companies
target_key: company_id
backfill_columns:
  - { source: inst, target: institution, aggregation: { type: max_by, order_column: scale } }
"#);
    let batch = batch(json!([
        {"company": "C1", "inst": "A", "scale": 100},
        {"company": "C1", "inst": "B", "scale": 100},
    ]));
    let out = run(&fk, &batch);
    assert_eq!(value_of(&out, "C1", 0), &json!("A"));
}

#[test]
fn test_max_by_picks_greatest_order() {
    let fk = fk(r#"
name: company
source_column: company
target_table: companies
target_key: company_id
backfill_columns:
  - { source: inst, target: institution, aggregation: { type: max_by, order_column: scale } }
"#);
    let batch = batch(json!([
        {"company": "C1", "inst": "A", "scale": 20},
        {"company": "C1", "inst": "B", "scale": "300"},
        {"company": "C1", "inst": "", "scale": 999},
        {"company": "C1", "inst": "D", "scale": null},
    ]));
    let out = run(&fk, &batch);
    // blank values are skipped before ranking
    assert_eq!(value_of(&out, "C1", 0), &json!("B"));
}

#[test]
fn test_concat_distinct_sorted() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
backfill_columns:
  - { source: kind, target: kinds, aggregation: { type: concat_distinct, separator: ",", sort: true } }
"#);
    let batch = batch(json!([
        {"plan": "P1", "kind": "乙"},
        {"plan": "P1", "kind": "甲"},
        {"plan": "P1", "kind": "甲"},
    ]));
    let out = run(&fk, &batch);
    assert_eq!(value_of(&out, "P1", 0), &json!("甲,乙"));
}

#[test]
fn test_concat_distinct_unsorted_keeps_first_seen_order() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
backfill_columns:
  - { source: kind, target: kinds, aggregation: { type: concat_distinct, separator: " | " } }
"#);
    let batch = batch(json!([
        {"plan": "P1", "kind": "zeta"},
        {"plan": "P1", "kind": "  "},
        {"plan": "P1", "kind": "alpha"},
        {"plan": "P1", "kind": "zeta"},
        {"plan": "P2", "kind": null},
    ]));
    let out = run(&fk, &batch);
    assert_eq!(value_of(&out, "P1", 0), &json!("zeta | alpha"));
    assert_eq!(value_of(&out, "P2", 0), &Value::Null);
}

#[test]
fn test_count_distinct_and_template() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
backfill_columns:
  - { source: customer, target: customers, aggregation: { type: count_distinct } }
  - { target: origin, aggregation: { type: template, text: "fact backfill" } }
"#);
    let batch = batch(json!([
        {"plan": "P1", "customer": "c1"},
        {"plan": "P1", "customer": "c2"},
        {"plan": "P1", "customer": "c1"},
        {"plan": "P1", "customer": ""},
    ]));
    let out = run(&fk, &batch);
    assert_eq!(value_of(&out, "P1", 0), &json!(2));
    assert_eq!(value_of(&out, "P1", 1), &json!("fact backfill"));
}

#[test]
fn test_first_respects_skip_blank_values() {
    let yaml = r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
skip_blank_values: SKIP
backfill_columns:
  - { source: name, target: name }
"#;
    let batch = batch(json!([
        {"plan": "P1", "name": ""},
        {"plan": "P1", "name": "Plan One"},
    ]));

    let skipping = fk(&yaml.replace("SKIP", "true"));
    assert_eq!(value_of(&run(&skipping, &batch), "P1", 0), &json!("Plan One"));

    let keeping = fk(&yaml.replace("SKIP", "false"));
    assert_eq!(value_of(&run(&keeping, &batch), "P1", 0), &json!(""));
}

#[test]
fn test_jsonb_append_failure_is_isolated_per_group() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
backfill_columns:
  - target: tags
    aggregation:
      type: jsonb_append
      code: "fail('boom') if key == 'BAD' else rows | pluck('tag') | non_blank | distinct"
"#);
    let batch = batch(json!([
        {"plan": "P1", "tag": "2501中标"},
        {"plan": "BAD", "tag": "x"},
        {"plan": "P1", "tag": "2501中标"},
        {"plan": "P2", "tag": "2502中标"},
    ]));
    let out = run(&fk, &batch);

    assert_eq!(out.records.len(), 3);
    assert_eq!(value_of(&out, "P1", 0), &json!(["2501中标"]));
    assert_eq!(value_of(&out, "P2", 0), &json!(["2502中标"]));
    assert_eq!(value_of(&out, "BAD", 0), &json!([]));

    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].key, "BAD");
    assert_eq!(out.errors[0].column, "tags");
    assert!(out.errors[0].message.contains("boom"));
}

#[test]
fn test_jsonb_append_wraps_scalars_and_drops_duplicates() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
backfill_columns:
  - { target: single, aggregation: { type: jsonb_append, code: "key" } }
  - { target: none, aggregation: { type: jsonb_append, code: "none" } }
  - { target: dupes, aggregation: { type: jsonb_append, code: "rows | pluck('tag')" } }
"#);
    let batch = batch(json!([
        {"plan": "P1", "tag": "a"},
        {"plan": "P1", "tag": null},
        {"plan": "P1", "tag": "a"},
    ]));
    let out = run(&fk, &batch);
    assert_eq!(value_of(&out, "P1", 0), &json!(["P1"]));
    assert_eq!(value_of(&out, "P1", 1), &json!([]));
    assert_eq!(value_of(&out, "P1", 2), &json!(["a"]));
}

#[test]
fn test_lambda_scalar_and_non_scalar_failure() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
backfill_columns:
  - { target: row_count, aggregation: { type: lambda, code: "rows | length" } }
  - { target: bad, aggregation: { type: lambda, code: "rows | pluck('tag')" } }
"#);
    let batch = batch(json!([
        {"plan": "P1", "tag": "a"},
        {"plan": "P1", "tag": "b"},
    ]));
    let out = run(&fk, &batch);
    assert_eq!(value_of(&out, "P1", 0), &json!(2));
    assert_eq!(value_of(&out, "P1", 1), &Value::Null);
    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].column, "bad");
}

#[test]
fn test_group_rows() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
"#);
    let batch = batch(json!([
        {"plan": "P2"},
        {"plan": null},
        {"plan": "  "},
        {"plan": "P1"},
        {"plan": "P2"},
        {"plan": 7},
    ]));
    let groups = group_rows(&batch, &fk);
    let keys: Vec<&str> = groups.iter().map(|g| g.key_text.as_str()).collect();
    assert_eq!(keys, vec!["P2", "P1", "7"]);
    assert_eq!(groups[0].rows, vec![0, 4]);
    assert_eq!(groups[2].key, json!(7));
}

#[test]
fn test_group_rows_keeps_blank_keys_when_asked() {
    let fk = fk(r#"
name: plan
source_column: plan
target_table: plans
target_key: plan_code
skip_blank_values: false
"#);
    let batch = batch(json!([{"plan": ""}, {"plan": null}]));
    let groups = group_rows(&batch, &fk);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].key_text, "");
}

#[test]
fn test_group_rows_without_source_column() {
    let fk = fk("{name: plan, source_column: missing, target_table: plans, target_key: code}");
    let batch = batch(json!([{"plan": "P1"}]));
    assert!(group_rows(&batch, &fk).is_empty());
}

#[test]
fn test_collate_orders_ascii_before_hanzi() {
    let mut values = vec!["乙".to_string(), "b".to_string(), "甲".to_string(), "A".to_string()];
    collate(&mut values);
    assert_eq!(values, vec!["A", "b", "甲", "乙"]);
}
