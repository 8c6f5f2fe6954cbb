//! End-to-end copies between SQLite files.

use std::path::Path;

use tablecopy::{
    connect, ColumnMapping, Connection, Endpoint, IncrementalFilter, Orchestrator, Reconciliation,
    RowCount, RunPlan, SqlValue, TableJob,
};
use tempfile::TempDir;

async fn seed(path: &Path, rows: i64) -> Box<dyn Connection> {
    let conn = connect("sqlite", path.to_str().unwrap()).await.unwrap();
    conn.execute(
        "CREATE TABLE users (user_id INTEGER NOT NULL, email TEXT, score REAL, updated_at TEXT)",
        &[],
    )
    .await
    .unwrap();

    let mut session = conn.begin().await.unwrap();
    for i in 1..=rows {
        session
            .execute(
                "INSERT INTO users (user_id, email, score, updated_at) VALUES (?, ?, ?, ?)",
                &[
                    SqlValue::I64(i),
                    SqlValue::Text(format!("user{}@example.com", i)),
                    SqlValue::F64(i as f64 / 2.0),
                    SqlValue::Text(format!("2024-01-{:02}", (i % 28) + 1)),
                ],
            )
            .await
            .unwrap();
    }
    session.commit().await.unwrap();
    conn
}

fn endpoints(dir: &TempDir) -> (Endpoint, Endpoint) {
    let source = dir.path().join("source.db");
    let target = dir.path().join("target.db");
    (
        Endpoint::new("sqlite3", source.to_str().unwrap()),
        Endpoint::new("sqlite", target.to_str().unwrap()),
    )
}

async fn run(plan: RunPlan) -> tablecopy::Result<tablecopy::RunSummary> {
    let orchestrator = Orchestrator::new(plan).await?;
    let summary = orchestrator.run(None).await;
    orchestrator.close().await;
    summary
}

#[tokio::test]
async fn copies_with_auto_create_and_mapping() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 2500).await;

    let job = TableJob::for_table("users")
        .with_target("customers")
        .with_batch_size(1000)
        .with_auto_create(true)
        .with_columns(vec![
            ColumnMapping::new("user_id").to("customer_id"),
            ColumnMapping::new("email"),
        ]);
    let summary = run(RunPlan::single(source, target.clone(), job).unwrap())
        .await
        .unwrap();

    let result = &summary.tables[0];
    assert_eq!(result.migrated, 2500);
    assert_eq!(result.source_count, RowCount::Known(2500));
    assert_eq!(result.target_count, RowCount::Known(2500));
    assert_eq!(result.reconciliation(), Reconciliation::Match);

    let dst = connect("sqlite", &target.dsn).await.unwrap();
    let sum = dst
        .query_scalar_i64("SELECT SUM(customer_id) FROM customers", &[])
        .await
        .unwrap();
    assert_eq!(sum, Some(2500 * 2501 / 2));
    let email = dst
        .query_strings("SELECT email FROM customers WHERE customer_id = 42", &[])
        .await
        .unwrap();
    assert_eq!(email, vec!["user42@example.com"]);
}

#[tokio::test]
async fn rerun_appends_without_recreating() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 10).await;

    let job = TableJob::for_table("users").with_auto_create(true);
    run(RunPlan::single(source.clone(), target.clone(), job.clone()).unwrap())
        .await
        .unwrap();
    let summary = run(RunPlan::single(source, target, job).unwrap())
        .await
        .unwrap();

    let result = &summary.tables[0];
    assert_eq!(result.target_count, RowCount::Known(20));
    assert_eq!(result.reconciliation(), Reconciliation::Surplus(10));
    assert_eq!(summary.mismatches().count(), 1);
}

#[tokio::test]
async fn incremental_bounds_filter_rows_and_counts() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 100).await;

    let job = TableJob::for_table("users")
        .with_auto_create(true)
        .with_incremental(IncrementalFilter {
            key: "user_id".into(),
            since: Some("expr:90".into()),
            until: None,
        });
    let summary = run(RunPlan::single(source, target, job).unwrap())
        .await
        .unwrap();
    let result = &summary.tables[0];
    assert_eq!(result.migrated, 10);
    assert_eq!(result.source_count, RowCount::Known(10));
}

#[tokio::test]
async fn dry_run_leaves_target_untouched() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 7).await;

    let job = TableJob::for_table("users").with_auto_create(true);
    let plan = RunPlan::single(source, target.clone(), job)
        .unwrap()
        .with_dry_run(true);
    let summary = run(plan).await.unwrap();

    let result = &summary.tables[0];
    assert!(result.dry_run);
    assert_eq!(result.migrated, 7);
    assert!(matches!(result.target_count, RowCount::Unknown(_)));
    assert!(summary.incomplete);

    let dst = connect("sqlite", &target.dsn).await.unwrap();
    assert!(tablecopy::core::list_tables(dst.as_ref(), None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn custom_select_into_new_table() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 30).await;

    let job = TableJob::for_query(
        "SELECT user_id, score * 2 AS doubled FROM users WHERE user_id <= 5",
        "doubled_scores",
    )
    .with_auto_create(true);
    let summary = run(RunPlan::single(source, target.clone(), job).unwrap())
        .await
        .unwrap();
    assert_eq!(summary.tables[0].migrated, 5);
    assert_eq!(summary.tables[0].source_count, RowCount::Known(5));

    let dst = connect("sqlite", &target.dsn).await.unwrap();
    let ids = dst
        .query_strings("SELECT user_id FROM doubled_scores ORDER BY user_id", &[])
        .await
        .unwrap();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn missing_source_table_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 1).await;

    let job = TableJob::for_table("nope");
    let err = run(RunPlan::single(source, target, job).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn auto_create_keeps_source_not_null() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 3).await;

    let job = TableJob::for_table("users").with_auto_create(true);
    run(RunPlan::single(source, target.clone(), job).unwrap())
        .await
        .unwrap();

    let dst = connect("sqlite", &target.dsn).await.unwrap();
    let ddl = dst
        .query_strings("SELECT sql FROM sqlite_master WHERE name = 'users'", &[])
        .await
        .unwrap();
    assert_eq!(ddl.len(), 1);
    let line_for = |column: &str| {
        ddl[0]
            .lines()
            .find(|l| l.contains(column))
            .unwrap_or_else(|| panic!("{} missing from {}", column, ddl[0]))
            .to_string()
    };
    assert!(line_for("user_id").contains("NOT NULL"), "{}", ddl[0]);
    assert!(!line_for("email").contains("NOT NULL"), "{}", ddl[0]);
}

#[tokio::test]
async fn failed_batch_is_rolled_back() {
    let dir = TempDir::new().unwrap();
    let (source, target) = endpoints(&dir);
    seed(&dir.path().join("source.db"), 2500).await;

    let dst = connect("sqlite", &target.dsn).await.unwrap();
    dst.execute(
        "CREATE TABLE users (user_id INTEGER NOT NULL CHECK (user_id <> 1500), \
         email TEXT, score REAL, updated_at TEXT)",
        &[],
    )
    .await
    .unwrap();

    // Row 1500 lands in the second batch of 1000.
    let job = TableJob::for_table("users").with_batch_size(1000);
    let err = run(RunPlan::single(source, target, job).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 5);

    let count = dst
        .query_scalar_i64("SELECT COUNT(*) FROM users", &[])
        .await
        .unwrap();
    assert_eq!(count, Some(1000));
    let max = dst
        .query_scalar_i64("SELECT MAX(user_id) FROM users", &[])
        .await
        .unwrap();
    assert_eq!(max, Some(1000));
    dst.close().await;
}
