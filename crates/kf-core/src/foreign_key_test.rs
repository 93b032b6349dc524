use super::*;

fn parse(yaml: &str) -> ForeignKeyConfig {
    serde_yaml::from_str(yaml).unwrap()
}

fn validate(fk: &ForeignKeyConfig) -> CoreResult<()> {
    fk.validate(&ExpressionEvaluator::new(), &["_source"])
}

#[test]
fn test_parse_full_descriptor() {
    let fk = parse(
        r#"
name: plan
source_column: plan_code
target_table: plans
target_key: plan_code
target_schema: mapping
mode: fill_null_only
skip_blank_values: false
depends_on: [org_unit]
backfill_columns:
  - source: plan_name
    target: name
  - source: institution
    target: institution
    aggregation: { type: max_by, order_column: scale }
  - source: product
    target: products
    optional: true
    aggregation: { type: concat_distinct, separator: ",", sort: true }
  - source: customer
    target: customer_count
    aggregation: { type: count_distinct }
  - target: plan_kind
    aggregation: { type: template, text: "auto" }
  - target: row_count
    aggregation: { type: lambda, code: "rows | length" }
  - target: tags
    aggregation: { type: jsonb_append, code: "rows | pluck('tag') | non_blank | distinct" }
"#,
    );
    assert_eq!(fk.mode, BackfillMode::FillNullOnly);
    assert!(!fk.skip_blank_values);
    assert_eq!(fk.qualified_table().to_string(), "mapping.plans");
    assert_eq!(fk.backfill_columns[0].aggregation, AggregationConfig::First);
    assert_eq!(
        fk.backfill_columns[2].aggregation,
        AggregationConfig::ConcatDistinct {
            separator: ",".to_string(),
            sort: true
        }
    );
    assert!(fk.has_array_columns());
    assert!(fk.backfill_columns[6].target_column().is_array());
    assert!(!fk.backfill_columns[0].target_column().is_array());
    assert_eq!(
        fk.fact_columns(),
        vec!["plan_code", "plan_name", "institution", "scale", "product", "customer"]
    );
    validate(&fk).unwrap();
}

#[test]
fn test_defaults() {
    let fk = parse("{name: plan, source_column: p, target_table: plans, target_key: code}");
    assert_eq!(fk.mode, BackfillMode::InsertMissing);
    assert!(fk.skip_blank_values);
    assert!(fk.depends_on.is_empty());
    assert!(fk.target_schema.is_none());
    assert_eq!(fk.qualified_table().to_string(), "plans");
}

#[test]
fn test_missing_required_parameter_is_rejected_by_type() {
    let err = serde_yaml::from_str::<AggregationConfig>("{type: max_by}").unwrap_err();
    assert!(err.to_string().contains("order_column"));

    let err = serde_yaml::from_str::<AggregationConfig>("{type: concat_distinct}").unwrap_err();
    assert!(err.to_string().contains("separator"));

    let err = serde_yaml::from_str::<AggregationConfig>("{type: jsonb_append}").unwrap_err();
    assert!(err.to_string().contains("code"));
}

#[test]
fn test_unknown_strategy_rejected() {
    let err = serde_yaml::from_str::<AggregationConfig>("{type: median}").unwrap_err();
    assert!(err.to_string().contains("median"));
}

#[test]
fn test_empty_order_column_rejected() {
    let fk = parse(
        r#"
name: plan
source_column: p
target_table: plans
target_key: code
backfill_columns:
  - { source: a, target: a, aggregation: { type: max_by, order_column: "" } }
"#,
    );
    assert!(matches!(
        validate(&fk),
        Err(CoreError::InvalidAggregation { ref column, .. }) if column == "a"
    ));
}

#[test]
fn test_source_required_for_row_strategies() {
    let fk = parse(
        r#"
name: plan
source_column: p
target_table: plans
target_key: code
backfill_columns:
  - { target: a, aggregation: { type: count_distinct } }
"#,
    );
    let err = validate(&fk).unwrap_err();
    assert!(err.to_string().contains("requires a 'source' column"));
}

#[test]
fn test_bad_expression_rejected_at_load() {
    let fk = parse(
        r#"
name: plan
source_column: p
target_table: plans
target_key: code
backfill_columns:
  - { target: tags, aggregation: { type: jsonb_append, code: "rows | pluck(" } }
"#,
    );
    let err = validate(&fk).unwrap_err();
    assert!(matches!(err, CoreError::InvalidAggregation { .. }));
    assert!(err.is_configuration_error());
}

#[test]
fn test_target_key_and_reserved_columns_rejected() {
    let fk = parse(
        r#"
name: plan
source_column: p
target_table: plans
target_key: code
backfill_columns:
  - { source: p, target: code }
"#,
    );
    assert!(validate(&fk).is_err());

    let fk = parse(
        r#"
name: plan
source_column: p
target_table: plans
target_key: code
backfill_columns:
  - { source: p, target: _source }
"#,
    );
    assert!(validate(&fk).unwrap_err().to_string().contains("reserved"));
}

#[test]
fn test_duplicate_target_rejected() {
    let fk = parse(
        r#"
name: plan
source_column: p
target_table: plans
target_key: code
backfill_columns:
  - { source: a, target: name }
  - { source: b, target: name }
"#,
    );
    assert!(validate(&fk).unwrap_err().to_string().contains("more than once"));
}

#[test]
fn test_required_fact_columns() {
    let fk = parse(
        r#"
name: plan
source_column: p
target_table: plans
target_key: code
backfill_columns:
  - { source: inst, target: inst, aggregation: { type: max_by, order_column: scale } }
  - { source: ignored, target: t, aggregation: { type: template, text: x } }
"#,
    );
    assert_eq!(
        fk.backfill_columns[0].required_fact_columns(),
        vec!["inst", "scale"]
    );
    assert!(fk.backfill_columns[1].required_fact_columns().is_empty());
}
