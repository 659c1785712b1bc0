//! Integration tests for the migration engine.
//!
//! These tests run real migration directories against the in-memory driver
//! and verify ordering checks, checksum verification and idempotence.

use std::path::Path;

use pretty_assertions::assert_eq;
use quarry::migrate::{DEFAULT_HISTORY_TABLE, MigrationConfig, MigrationError, Migrator};
use quarry::query::connection::testing::MemoryDriver;
use quarry::query::{ConnectionPool, PoolOptions};

fn write(dir: &Path, name: &str, sql: &str) {
    std::fs::write(dir.join(name), sql).expect("write migration");
}

async fn pool(driver: &MemoryDriver) -> ConnectionPool<MemoryDriver> {
    ConnectionPool::connect(driver.clone(), PoolOptions::development())
        .await
        .expect("pool")
}

fn migrator(dir: &Path) -> Migrator {
    Migrator::new(MigrationConfig::new().migrations_dir(dir)).expect("migrator")
}

#[tokio::test]
async fn test_gap_in_versions_fails_discovery() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
    write(dir.path(), "3_add_col.sql", "CREATE TABLE b (id INT);");
    let driver = MemoryDriver::new();

    let err = migrator(dir.path()).run(&pool(&driver).await).await.unwrap_err();
    assert!(matches!(err, MigrationError::NonContiguousVersion { previous: 1, next: 3 }));
    assert!(err.is_discovery_error());
    // Nothing touched the database.
    assert!(driver.executed().is_empty());
}

#[tokio::test]
async fn test_relaxed_sequence_allows_gaps() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
    write(dir.path(), "3_add_col.sql", "CREATE TABLE b (id INT);");
    let driver = MemoryDriver::new();

    let migrator = Migrator::new(
        MigrationConfig::new()
            .migrations_dir(dir.path())
            .strict_sequence(false),
    )
    .unwrap();
    let report = migrator.run(&pool(&driver).await).await.unwrap();
    assert_eq!(report.applied.len(), 2);
}

#[tokio::test]
async fn test_duplicate_versions_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
    write(dir.path(), "01_again.sql", "CREATE TABLE b (id INT);");
    let driver = MemoryDriver::new();

    let err = migrator(dir.path()).run(&pool(&driver).await).await.unwrap_err();
    assert!(matches!(err, MigrationError::DuplicateVersion { version: 1, .. }));
}

#[tokio::test]
async fn test_malformed_file_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
    write(dir.path(), "add column.sql", "CREATE TABLE b (id INT);");
    let driver = MemoryDriver::new();

    let err = migrator(dir.path()).run(&pool(&driver).await).await.unwrap_err();
    assert!(matches!(err, MigrationError::InvalidFileName(_)));
}

#[tokio::test]
async fn test_edited_file_fails_with_checksum_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_init.sql", "CREATE TABLE users (id BIGINT);");
    let driver = MemoryDriver::new();
    let pool = pool(&driver).await;

    let first = migrator(dir.path()).run(&pool).await.unwrap();
    assert_eq!(first.applied.len(), 1);
    let recorded = first.applied[0].checksum.clone();

    write(dir.path(), "1_init.sql", "CREATE TABLE users (id BIGINT, email TEXT);");
    let err = migrator(dir.path()).run(&pool).await.unwrap_err();
    match err {
        MigrationError::ChecksumMismatch {
            version,
            expected,
            actual,
            ..
        } => {
            assert_eq!(version, 1);
            assert_eq!(expected, recorded);
            assert_ne!(actual, recorded);
        }
        other => panic!("expected checksum mismatch, got {other}"),
    }
    assert_eq!(pool.pool_in_use(), 0);
}

#[tokio::test]
async fn test_second_run_applies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "1_init.sql",
        "CREATE TABLE notes (id BIGINT, body TEXT);\n\
         INSERT INTO notes (id, body) VALUES (1, 'semi; colon');",
    );
    write(
        dir.path(),
        "2_fn.sql",
        "CREATE FUNCTION touch() RETURNS trigger AS $body$\nBEGIN\n  NEW.x := 1;\n  RETURN NEW;\nEND;\n$body$ LANGUAGE plpgsql;",
    );
    let driver = MemoryDriver::new();
    let pool = pool(&driver).await;
    let migrator = migrator(dir.path());

    let first = migrator.run(&pool).await.unwrap();
    assert_eq!(first.applied.len(), 2);
    assert_eq!(driver.rows("notes").len(), 1);
    assert_eq!(
        driver.rows("notes")[0].get("body").cloned().flatten().as_deref(),
        Some("semi; colon")
    );
    // The function body is sent as one statement.
    assert!(driver
        .executed()
        .iter()
        .any(|sql| sql.starts_with("CREATE FUNCTION") && sql.ends_with("LANGUAGE plpgsql")));

    let second = migrator.run(&pool).await.unwrap();
    assert!(!second.has_changes());
    assert_eq!(second.skipped, 2);
    assert_eq!(driver.rows(DEFAULT_HISTORY_TABLE).len(), 2);

    let status = migrator.status(&pool).await.unwrap();
    assert!(status.is_up_to_date());
}

#[tokio::test]
async fn test_new_file_applied_on_later_run() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
    let driver = MemoryDriver::new();
    let pool = pool(&driver).await;
    migrator(dir.path()).run(&pool).await.unwrap();

    write(dir.path(), "2_next.sql", "CREATE TABLE b (id INT);");
    let report = migrator(dir.path()).run(&pool).await.unwrap();
    let versions: Vec<u64> = report.applied.iter().map(|m| m.version).collect();
    assert_eq!(versions, vec![2]);
    assert_eq!(report.skipped, 1);
    assert!(driver.table_exists("b"));
}

#[tokio::test]
async fn test_tampered_history_row_detected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
    let driver = MemoryDriver::new();
    let pool = pool(&driver).await;
    migrator(dir.path()).run(&pool).await.unwrap();

    driver.update_cell(DEFAULT_HISTORY_TABLE, "version", "1", "checksum", "0000");
    let err = migrator(dir.path()).run(&pool).await.unwrap_err();
    assert!(matches!(err, MigrationError::ChecksumMismatch { version: 1, .. }));
}
