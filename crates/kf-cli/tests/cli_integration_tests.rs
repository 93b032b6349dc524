//! Integration tests for the `kf` binary against a file-backed DuckDB project

use kf_core::FactBatch;
use kf_db::{DuckDbStore, ReferenceStore};
use serde_json::json;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Path to the compiled kf binary
fn kf_bin() -> String {
    env!("CARGO_BIN_EXE_kf").to_string()
}

/// Run a `kf` command in `project` and return (stdout, stderr, exit code).
fn run_kf(project: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let output = Command::new(kf_bin())
        .arg("--project-dir")
        .arg(project)
        .args(args)
        .env_remove("KF_TARGET")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to execute kf with args {:?}: {}", args, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code(),
    )
}

const CONFIG: &str = r#"
name: warehouse
database: { type: duckdb, path: warehouse.duckdb }
domains:
  annuity:
    facts: { csv: facts.csv }
    foreign_keys:
      - name: portfolio
        source_column: portfolio_code
        target_table: portfolios
        target_key: portfolio_code
        depends_on: [plan]
        backfill_columns:
          - { source: plan_code, target: plan_code }
      - name: plan
        source_column: plan_code
        target_table: plans
        target_key: plan_code
        backfill_columns:
          - source: plan_name
            target: name
            aggregation: { type: max_by, order_column: scale }
  trustee:
    facts: { table: trustee_facts }
    foreign_keys:
      - name: trustee
        source_column: trustee_code
        target_table: missing_trustees
        target_key: trustee_code
"#;

const FACTS: &str = "plan_code,plan_name,scale,portfolio_code
P1,Alpha,10,F1
P1,Alpha Prime,30,F1
P2,Beta,5,F2
";

const TRACKING: &str =
    "_source VARCHAR, _needs_review BOOLEAN, _derived_from_domain VARCHAR, _derived_at TIMESTAMP";

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("keyfill.yml"), CONFIG).unwrap();
    std::fs::write(dir.path().join("facts.csv"), FACTS).unwrap();

    let store = DuckDbStore::from_path(&dir.path().join("warehouse.duckdb")).unwrap();
    store
        .execute_batch(&format!(
            "CREATE TABLE plans (plan_code VARCHAR PRIMARY KEY, name VARCHAR, {TRACKING});
             CREATE TABLE portfolios (portfolio_code VARCHAR PRIMARY KEY, plan_code VARCHAR, {TRACKING});
             CREATE TABLE trustee_facts (trustee_code VARCHAR);
             INSERT INTO trustee_facts VALUES ('T1');"
        ))
        .unwrap();
    dir
}

fn query(dir: &TempDir, sql: &str) -> FactBatch {
    let store = DuckDbStore::from_path(&dir.path().join("warehouse.duckdb")).unwrap();
    store.load_facts(sql).unwrap()
}

#[test]
fn test_order_prints_dependencies_first() {
    let dir = project();
    let (stdout, stderr, code) = run_kf(dir.path(), &["order", "--domain", "annuity"]);
    assert_eq!(code, Some(0), "stderr: {}", stderr);

    let plan = stdout.find("plan -> plans").unwrap();
    let portfolio = stdout.find("portfolio -> portfolios").unwrap();
    assert!(plan < portfolio, "unexpected order:\n{}", stdout);
    assert!(stdout.contains("(after plan)"));
}

#[test]
fn test_validate_reports_missing_reference_table() {
    let dir = project();
    let (stdout, _, code) = run_kf(dir.path(), &["validate"]);
    assert_eq!(code, Some(1));
    assert!(stdout.contains("Domain 'annuity': 2 foreign keys (plan -> portfolio)"));
    assert!(stdout.contains("'missing_trustees'"));
}

#[test]
fn test_validate_rejects_cycle() {
    let dir = project();
    let cyclic = CONFIG.replace(
        "        target_key: plan_code\n        backfill_columns:",
        "        target_key: plan_code\n        depends_on: [portfolio]\n        backfill_columns:",
    );
    std::fs::write(dir.path().join("keyfill.yml"), cyclic).unwrap();

    let (_, stderr, code) = run_kf(dir.path(), &["validate"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Circular dependency"), "stderr: {}", stderr);
}

#[test]
fn test_plan_writes_nothing() {
    let dir = project();
    let (stdout, stderr, code) = run_kf(
        dir.path(),
        &["plan", "--domain", "annuity", "--output", "json"],
    );
    assert_eq!(code, Some(0), "stderr: {}", stderr);

    let summaries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let tables = &summaries[0]["tables"];
    assert_eq!(summaries[0]["mode"], json!("plan"));
    assert_eq!(tables[0]["fk"], json!("plan"));
    assert_eq!(tables[0]["status"], json!("planned"));
    assert_eq!(tables[0]["inserted"], json!(2));
    assert!(tables[0]["statement"]
        .as_str()
        .unwrap()
        .contains("INSERT INTO"));

    let plans = query(&dir, "SELECT count(*) AS n FROM plans");
    assert_eq!(plans.value("n", 0), Some(&json!(0)));
}

#[test]
fn test_run_backfills_and_is_idempotent() {
    let dir = project();
    let (stdout, stderr, code) = run_kf(dir.path(), &["run", "--domain", "annuity"]);
    assert_eq!(code, Some(0), "stderr: {}", stderr);
    assert!(stdout.contains("Total: 4 inserted, 0 updated, 0 skipped"));

    let plans = query(
        &dir,
        "SELECT plan_code, name, _source, _needs_review FROM plans ORDER BY plan_code",
    );
    assert_eq!(plans.column("name").unwrap(), &[json!("Alpha Prime"), json!("Beta")]);
    assert_eq!(plans.value("_source", 0), Some(&json!("auto_derived")));
    assert_eq!(plans.value("_needs_review", 1), Some(&json!(true)));

    let (stdout, _, code) = run_kf(dir.path(), &["run", "--domain", "annuity"]);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Total: 0 inserted, 0 updated, 4 skipped"));
}

#[test]
fn test_run_with_facts_override() {
    let dir = project();
    let other = dir.path().join("other.csv");
    std::fs::write(&other, "plan_code,plan_name,scale,portfolio_code\nP9,Nine,1,F9\n").unwrap();

    let (_, stderr, code) = run_kf(
        dir.path(),
        &["run", "-d", "annuity", "--facts", other.to_str().unwrap()],
    );
    assert_eq!(code, Some(0), "stderr: {}", stderr);

    let plans = query(&dir, "SELECT plan_code FROM plans");
    assert_eq!(plans.column("plan_code").unwrap(), &[json!("P9")]);
}

#[test]
fn test_run_all_domains_reports_failure() {
    let dir = project();
    let (stdout, _, code) = run_kf(dir.path(), &["run"]);
    // The trustee reference table does not exist
    assert_eq!(code, Some(1));
    assert!(stdout.contains("Domain 'annuity'"));
    assert!(stdout.contains("Domain 'trustee'"));
    assert!(stdout.contains("failed"));

    let plans = query(&dir, "SELECT count(*) AS n FROM plans");
    assert_eq!(plans.value("n", 0), Some(&json!(2)));
}
