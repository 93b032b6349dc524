use super::*;
use serde_json::json;

fn store_with_plans() -> DuckDbStore {
    let db = DuckDbStore::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE plans (plan_code VARCHAR PRIMARY KEY, name VARCHAR, tags VARCHAR[]);
         INSERT INTO plans VALUES
           ('P1', 'Plan One', ['2501中标']),
           ('P2', NULL, NULL),
           ('P3', 'Plan Three', []);",
    )
    .unwrap();
    db
}

fn probe(keys: Vec<Value>) -> ExistingProbe {
    ExistingProbe {
        table: QualifiedTable::new(None, "plans"),
        key_column: "plan_code".to_string(),
        null_check_columns: vec!["name".to_string()],
        array_columns: vec!["tags".to_string()],
        keys,
    }
}

#[test]
fn test_in_memory() {
    let db = DuckDbStore::in_memory().unwrap();
    assert_eq!(db.db_type(), DbType::DuckDb);
}

#[test]
fn test_execute_returns_affected_rows() {
    let db = store_with_plans();
    let n = db
        .execute("UPDATE plans SET name = 'x' WHERE plan_code IN ('P1', 'P2')")
        .unwrap();
    assert_eq!(n, 2);
}

#[test]
fn test_relation_exists() {
    let db = store_with_plans();
    assert!(db
        .relation_exists(&QualifiedTable::new(None, "plans"))
        .unwrap());
    assert!(!db
        .relation_exists(&QualifiedTable::new(None, "nonexistent"))
        .unwrap());

    db.execute_batch("CREATE SCHEMA mapping; CREATE TABLE mapping.plans (id INT);")
        .unwrap();
    assert!(db
        .relation_exists(&QualifiedTable::new(Some("mapping".to_string()), "plans"))
        .unwrap());
}

#[test]
fn test_fetch_existing() {
    let db = store_with_plans();
    let sql = "SELECT CAST(plan_code AS VARCHAR), (name IS NULL), tags FROM plans \
               WHERE CAST(plan_code AS VARCHAR) IN ('P1', 'P2', 'P3', 'P9')";
    let existing = db
        .fetch_existing(sql, &probe(vec![json!("P1"), json!("P2"), json!("P9")]))
        .unwrap();

    assert_eq!(existing.len(), 3);
    assert!(!existing.contains_key("P9"));

    let p1 = &existing["P1"];
    assert!(p1.null_columns.is_empty());
    assert_eq!(p1.arrays["tags"], vec![json!("2501中标")]);
    assert!(!p1.has_gaps());

    let p2 = &existing["P2"];
    assert!(p2.null_columns.contains("name"));
    assert!(p2.arrays["tags"].is_empty());
    assert!(p2.null_arrays.contains("tags"));
    assert!(p2.has_gaps());

    // an empty array is a gap too, but not a null one
    assert!(existing["P3"].has_gaps());
    assert!(existing["P3"].null_arrays.is_empty());
    assert!(p1.null_arrays.is_empty());
}

#[test]
fn test_fetch_existing_checks_shape() {
    let db = store_with_plans();
    let err = db
        .fetch_existing(
            "SELECT plan_code, (name IS NULL), tags, 1 FROM plans",
            &probe(vec![json!("P1")]),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::UnexpectedResult(_)));
}

#[test]
fn test_load_facts_types() {
    let db = DuckDbStore::in_memory().unwrap();
    let batch = db
        .load_facts(
            "SELECT * FROM (VALUES
               ('P1', 100, 1.5::DOUBLE, TRUE, DATE '2024-03-01', ['a', 'b']),
               (NULL, NULL, NULL, NULL, NULL, NULL)
             ) t(code, scale, rate, active, as_of, tags)",
        )
        .unwrap();

    assert_eq!(batch.num_rows(), 2);
    assert_eq!(
        batch.column_names(),
        &["code", "scale", "rate", "active", "as_of", "tags"]
    );
    assert_eq!(batch.value("code", 0), Some(&json!("P1")));
    assert_eq!(batch.value("scale", 0), Some(&json!(100)));
    assert_eq!(batch.value("rate", 0), Some(&json!(1.5)));
    assert_eq!(batch.value("active", 0), Some(&json!(true)));
    assert_eq!(batch.value("as_of", 0), Some(&json!("2024-03-01")));
    assert_eq!(batch.value("tags", 0), Some(&json!(["a", "b"])));
    assert_eq!(batch.value("code", 1), Some(&Value::Null));
    assert_eq!(batch.value("tags", 1), Some(&Value::Null));
}

#[test]
fn test_load_facts_timestamp() {
    let db = DuckDbStore::in_memory().unwrap();
    let batch = db
        .load_facts("SELECT TIMESTAMP '2024-03-01 08:30:00' AS ts")
        .unwrap();
    let ts = batch.value("ts", 0).and_then(|v| v.as_str()).unwrap();
    assert!(ts.starts_with("2024-03-01 08:30:00"), "got {ts}");
}

#[test]
fn test_load_facts_empty_result_keeps_columns() {
    let db = store_with_plans();
    let batch = db
        .load_facts("SELECT plan_code, name FROM plans WHERE 1 = 0")
        .unwrap();
    assert!(batch.is_empty());
    assert!(batch.has_column("plan_code"));
}

#[test]
fn test_load_facts_missing_table() {
    let db = DuckDbStore::in_memory().unwrap();
    let err = db.load_facts("SELECT * FROM nope").unwrap_err();
    assert!(matches!(err, DbError::TableNotFound(_)));
}

#[test]
fn test_try_clone_shares_database() {
    let db = store_with_plans();
    let other = db.try_clone().unwrap();
    other
        .execute("INSERT INTO plans VALUES ('P4', 'Plan Four', [])")
        .unwrap();
    let batch = db.load_facts("SELECT COUNT(*) AS n FROM plans").unwrap();
    assert_eq!(batch.value("n", 0), Some(&json!(4)));
}

#[test]
fn test_file_backed_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warehouse.duckdb");
    {
        let db = DuckDbStore::from_path(&path).unwrap();
        db.execute_batch("CREATE TABLE plans (plan_code VARCHAR PRIMARY KEY)")
            .unwrap();
    }
    let db = DuckDbStore::new(path.to_str().unwrap()).unwrap();
    assert!(db
        .relation_exists(&QualifiedTable::new(None, "plans"))
        .unwrap());
}
