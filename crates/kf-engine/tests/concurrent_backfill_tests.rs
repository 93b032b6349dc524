//! Domains backfilling the same reference table at the same time

use kf_core::{Config, FactBatch, RunMode, TableStatus};
use kf_db::{DuckDbStore, ReferenceStore};
use kf_engine::{HybridReferenceCoordinator, RetryPolicy};
use serde_json::{json, Map, Value};
use std::time::Duration;

const PROJECT: &str = r#"
name: warehouse
tracking: { enabled: false }
domains:
  a:
    foreign_keys:
      - name: plan
        source_column: plan_code
        target_table: plans
        target_key: plan_code
        backfill_columns:
          - target: tags
            aggregation:
              type: jsonb_append
              code: "rows | pluck('tag') | non_blank | distinct"
  b:
    foreign_keys:
      - name: plan
        source_column: plan_code
        target_table: plans
        target_key: plan_code
        backfill_columns:
          - target: tags
            aggregation:
              type: jsonb_append
              code: "rows | pluck('tag') | non_blank | distinct"
"#;

const KEYS_PER_ROUND: usize = 200;
const ROUNDS: usize = 10;

fn batch(round: usize, tag: &str) -> FactBatch {
    let rows: Vec<Map<String, Value>> = (0..KEYS_PER_ROUND)
        .map(|i| {
            serde_json::from_value(json!({"plan_code": format!("R{round}K{i}"), "tag": tag}))
                .unwrap()
        })
        .collect();
    FactBatch::from_rows(&rows)
}

fn patient_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        initial_delay: Duration::from_millis(5),
        ..RetryPolicy::default()
    }
}

/// Run every round for one domain on its own connection
fn backfill_rounds(store: DuckDbStore, config: &Config, domain: &str) -> Vec<String> {
    let coordinator = HybridReferenceCoordinator::new(&store, config.tracking.clone())
        .with_retry_policy(patient_retry());
    let mut failures = Vec::new();
    for round in 0..ROUNDS {
        let summary = coordinator
            .run(
                domain,
                config.domain(domain).unwrap(),
                &batch(round, domain),
                RunMode::Apply,
            )
            .unwrap();
        let plan = summary.table("plan").unwrap();
        if plan.status != TableStatus::Applied {
            failures.push(format!("{domain} round {round}: {:?}", plan.message));
        }
    }
    failures
}

#[test]
fn test_concurrent_domains_merge_the_same_keys() {
    let store = DuckDbStore::in_memory().unwrap();
    store
        .execute_batch("CREATE TABLE plans (plan_code VARCHAR PRIMARY KEY, tags VARCHAR[])")
        .unwrap();
    let config = Config::from_yaml_str(PROJECT).unwrap();

    let (conn_a, conn_b) = (store.try_clone().unwrap(), store.try_clone().unwrap());
    let failures: Vec<String> = std::thread::scope(|s| {
        let a = s.spawn(|| backfill_rounds(conn_a, &config, "a"));
        let b = s.spawn(|| backfill_rounds(conn_b, &config, "b"));
        let mut failures = a.join().unwrap();
        failures.extend(b.join().unwrap());
        failures
    });
    assert!(failures.is_empty(), "failed passes: {:?}", failures);

    let rows = store
        .load_facts(
            "SELECT count(*) AS total,
                    count(*) FILTER (WHERE len(tags) = 2) AS merged
             FROM plans",
        )
        .unwrap();
    let expected = (KEYS_PER_ROUND * ROUNDS) as i64;
    assert_eq!(rows.value("total", 0), Some(&json!(expected)));
    assert_eq!(rows.value("merged", 0), Some(&json!(expected)));
}
