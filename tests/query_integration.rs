//! Integration tests for statements, the pool and the client.
//!
//! These tests verify:
//! - Placeholder rendering and escaping
//! - Pool bounds and acquire timeouts
//! - The client facade over the in-memory driver

use std::time::Duration;

use pretty_assertions::assert_eq;
use quarry::query::connection::testing::MemoryDriver;
use quarry::query::scanner;
use quarry::query::{
    ConnectionPool, Database, DatabaseType, ErrorCode, PoolOptions, SqlType, Statement, Value,
    ValueEncoderRegistry,
};

fn render(stmt: &Statement) -> String {
    stmt.render(&ValueEncoderRegistry::new()).expect("render")
}

#[test]
fn test_named_parameter_scenario() {
    let mut stmt = Statement::new("select * from t where id = :id");
    stmt.bind_named("id", 5).unwrap();
    assert_eq!(render(&stmt), "select * from t where id = 5");
}

#[test]
fn test_positional_quote_scenario() {
    let mut stmt = Statement::new("select * from t where name = ?");
    stmt.bind(0, "O'Brien").unwrap();
    assert_eq!(render(&stmt), "select * from t where name = 'O''Brien'");
}

#[test]
fn test_unbound_slot_fails_until_all_bound() {
    let mut stmt = Statement::new("update t set a = ?, b = :b where c = ?");
    let err = stmt.render(&ValueEncoderRegistry::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::ValueNotSupplied);

    stmt.bind(0, 1).unwrap().bind(1, 2).unwrap();
    let err = stmt.render(&ValueEncoderRegistry::new()).unwrap_err();
    assert_eq!(err.context.parameter.as_deref(), Some("b"));

    stmt.bind_named("b", Value::Null).unwrap();
    assert_eq!(render(&stmt), "update t set a = 1, b = NULL where c = 2");
    assert_eq!(render(&stmt), render(&stmt));
}

#[test]
fn test_hostile_values_stay_inside_one_literal() {
    let payloads = [
        "'; drop table users; --",
        "x' or '1'='1",
        "/* */ ; $$ $tag$",
        "\\'; select 1; --",
    ];
    for dialect in [DatabaseType::PostgreSQL, DatabaseType::MySQL, DatabaseType::SQLite] {
        for payload in payloads {
            let mut stmt = Statement::new("select * from t where name = :name");
            stmt.bind_named("name", payload).unwrap();
            let sql = stmt
                .render_dialect(dialect, &ValueEncoderRegistry::new())
                .unwrap();

            assert_eq!(scanner::split_statements(&sql).len(), 1, "{dialect:?}: {sql}");
            let literals = scanner::spans(&sql)
                .into_iter()
                .filter(|s| s.context == scanner::Context::SingleQuoted)
                .count();
            assert_eq!(literals, 1, "{dialect:?}: {sql}");
        }
    }
}

#[test]
fn test_placeholders_in_protected_spans_ignored() {
    let stmt = Statement::new(
        "select ':a', \"?\", `:b` /* :c ? */ , $$ :d $$, x::text -- :e\nfrom t where id = :id",
    );
    let names: Vec<&str> = stmt.parameter_names().collect();
    assert_eq!(names, vec!["id"]);
    assert_eq!(stmt.positional_count(), 0);
}

#[test]
fn test_native_rendering() {
    let mut stmt = Statement::new("select * from t where a = :a and b in :ids and c = :a");
    stmt.bind_named("a", "x")
        .unwrap()
        .bind_named("ids", vec![1, 2])
        .unwrap();

    let (sql, values) = stmt
        .render_native(DatabaseType::PostgreSQL, &ValueEncoderRegistry::new())
        .unwrap();
    assert_eq!(sql, "select * from t where a = $1 and b in ($2, $3) and c = $4");
    assert_eq!(
        values,
        vec![
            Value::from("x"),
            Value::Int(1),
            Value::Int(2),
            Value::from("x"),
        ]
    );
}

#[test]
fn test_typed_null() {
    let mut stmt = Statement::new("insert into t (d) values (?)");
    stmt.bind_null(0, SqlType::Date).unwrap();
    assert_eq!(render(&stmt), "insert into t (d) values (NULL::date)");
}

#[tokio::test]
async fn test_pool_acquire_times_out_when_exhausted() {
    let pool = ConnectionPool::connect(
        MemoryDriver::new(),
        PoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(50)),
    )
    .await
    .unwrap();

    let mut first = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(pool.pool_size(), 1);
    assert_eq!(pool.pool_idle_size(), 0);

    first.close().await.unwrap();
    assert_eq!(pool.pool_idle_size(), 1);
    let mut second = pool.acquire().await.unwrap();
    second.close().await.unwrap();
    pool.close().await;
}

#[tokio::test]
async fn test_pool_options_validated() {
    let invalid = [
        PoolOptions::new().max_connections(0),
        PoolOptions::new().max_connections(2).min_connections(3),
        PoolOptions::new().min_connections(0),
        PoolOptions::new().acquire_timeout(Duration::ZERO),
        PoolOptions::new()
            .idle_timeout(Duration::from_secs(60))
            .max_lifetime(Duration::from_secs(30)),
    ];
    for options in invalid {
        let err = ConnectionPool::new(MemoryDriver::new(), options).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    }
}

#[tokio::test]
async fn test_client_round_trip() {
    let driver = MemoryDriver::new();
    let db = Database::connect(driver.clone(), DatabaseType::PostgreSQL, PoolOptions::development())
        .await
        .unwrap();

    db.execute(&Statement::new("CREATE TABLE people (id BIGINT, name TEXT)"))
        .await
        .unwrap();
    let mut insert = Statement::new("INSERT INTO people (id, name) VALUES (:id, :name)");
    insert.bind_named("id", 1).unwrap().bind_named("name", "Zoë 'Z'").unwrap();
    db.execute(&insert).await.unwrap();

    let rows = db
        .fetch_all(&Statement::new("SELECT id, name FROM people ORDER BY id"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.rows()[0].get_i64("id").unwrap(), 1);
    assert_eq!(rows.rows()[0].get_str("name").unwrap(), "Zoë 'Z'");

    db.close().await;
    assert_eq!(db.acquire().await.unwrap_err().code, ErrorCode::PoolClosed);
}
