//! Integration tests for the embedded migrations.

use agriplan_db::pool;
use agriplan_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn migrations_create_every_table() {
    let (pool, db_name) = create_test_db().await;

    let counts = pool::table_counts(&pool)
        .await
        .expect("table_counts should succeed");

    let names: Vec<&str> = counts.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        [
            "fields",
            "plans",
            "schedule_tasks",
            "measurements",
            "replan_logs",
            "kb_documents",
            "kb_chunks",
        ]
    );
    assert!(counts.iter().all(|(_, n)| *n == 0));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    pool::run_migrations(&pool)
        .await
        .expect("second migration run should be a no-op");

    pool.close().await;
    drop_test_db(&db_name).await;
}
