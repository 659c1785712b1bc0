//! An in-memory scripted driver for tests.
//!
//! [`MemoryDriver`] is a [`ConnectionFactory`] whose connections never touch
//! a server. It records every statement, can be told to fail, and keeps a
//! tiny table store understanding just enough SQL for bookkeeping tables:
//!
//! - `CREATE TABLE [IF NOT EXISTS] name ...`
//! - `DROP TABLE [IF EXISTS] name`
//! - `INSERT INTO name (a, b) VALUES (x, y)`
//! - `SELECT a, b FROM name [ORDER BY a]`
//!
//! Any other statement succeeds and affects zero rows. Transactions work on
//! a snapshot of the store that replaces it on commit; concurrent
//! transactions are not isolated from each other.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ConnectionFactory, RawConnection};
use crate::error::{QueryError, QueryResult};
use crate::row::{Column, ResultSet};
use crate::scanner;
use crate::value::SqlType;

type Record = HashMap<String, Option<String>>;
type Tables = BTreeMap<String, Vec<Record>>;

#[derive(Default)]
struct DriverState {
    tables: Tables,
    executed: Vec<String>,
    committed: Vec<String>,
    failures: Vec<(String, String)>,
    responses: Vec<(String, ResultSet)>,
    connect_failures: usize,
    ping_ok: bool,
    connect_delay: Option<Duration>,
    opened: u64,
    closed: u64,
}

/// A scripted in-memory driver.
#[derive(Clone)]
pub struct MemoryDriver {
    state: Arc<Mutex<DriverState>>,
    next_id: Arc<AtomicU64>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// Create a driver with an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DriverState {
                ping_ok: true,
                ..DriverState::default()
            })),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Fail every statement containing `pattern` with a database error.
    pub fn fail_on(&self, pattern: impl Into<String>, message: impl Into<String>) {
        self.state.lock().failures.push((pattern.into(), message.into()));
    }

    /// Remove all scripted statement failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Fail the next `n` connection attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().connect_failures = n;
    }

    /// Make `ping` report the given liveness.
    pub fn set_ping(&self, alive: bool) {
        self.state.lock().ping_ok = alive;
    }

    /// Delay every connection attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// Answer `fetch_all` calls whose SQL contains `pattern` with `result`.
    pub fn respond_to(&self, pattern: impl Into<String>, result: ResultSet) {
        self.state.lock().responses.push((pattern.into(), result));
    }

    /// Every statement received, including transaction control.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Statements that took effect: outside a transaction or committed.
    pub fn committed(&self) -> Vec<String> {
        self.state.lock().committed.clone()
    }

    /// Whether a table exists in the store.
    pub fn table_exists(&self, name: &str) -> bool {
        self.state.lock().tables.contains_key(&name.to_ascii_lowercase())
    }

    /// Committed rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(&table.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite one cell in every row of `table` where `key_column == key`.
    pub fn update_cell(&self, table: &str, key_column: &str, key: &str, column: &str, value: &str) {
        let mut state = self.state.lock();
        if let Some(rows) = state.tables.get_mut(&table.to_ascii_lowercase()) {
            for row in rows.iter_mut() {
                if row.get(key_column).and_then(|v| v.as_deref()) == Some(key) {
                    row.insert(column.to_string(), Some(value.to_string()));
                }
            }
        }
    }

    /// Number of connections opened so far.
    pub fn connections_opened(&self) -> u64 {
        self.state.lock().opened
    }

    /// Number of connections closed so far.
    pub fn connections_closed(&self) -> u64 {
        self.state.lock().closed
    }
}

#[async_trait]
impl ConnectionFactory for MemoryDriver {
    type Connection = MemoryConnection;

    async fn connect(&self) -> QueryResult<MemoryConnection> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(QueryError::connection("scripted connection failure"));
        }
        state.opened += 1;
        drop(state);

        Ok(MemoryConnection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            state: Arc::clone(&self.state),
            transaction: None,
            closed: false,
        })
    }
}

struct OpenTransaction {
    snapshot: Tables,
    statements: Vec<String>,
}

/// A connection produced by [`MemoryDriver`].
pub struct MemoryConnection {
    id: u64,
    state: Arc<Mutex<DriverState>>,
    transaction: Option<OpenTransaction>,
    closed: bool,
}

impl MemoryConnection {
    /// Driver-assigned connection id, unique per driver.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a transaction is open on this connection.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn run(&mut self, sql: &str) -> QueryResult<Option<ResultSet>> {
        let mut state = self.state.lock();
        state.executed.push(sql.to_string());

        if let Some((_, message)) = state.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(QueryError::database(message.clone()).with_sql(sql));
        }
        if let Some((_, result)) = state.responses.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Ok(Some(result.clone()));
        }

        let outcome = match &mut self.transaction {
            Some(tx) => {
                let outcome = apply(&mut tx.snapshot, sql)?;
                tx.statements.push(sql.to_string());
                outcome
            }
            None => {
                let outcome = apply(&mut state.tables, sql)?;
                state.committed.push(sql.to_string());
                outcome
            }
        };
        Ok(outcome)
    }
}

#[async_trait]
impl RawConnection for MemoryConnection {
    async fn execute(&mut self, sql: &str) -> QueryResult<u64> {
        if self.closed {
            return Err(QueryError::connection_closed());
        }
        Ok(self.run(sql)?.map_or(0, |rs| rs.rows_affected))
    }

    async fn fetch_all(&mut self, sql: &str) -> QueryResult<ResultSet> {
        if self.closed {
            return Err(QueryError::connection_closed());
        }
        Ok(self.run(sql)?.unwrap_or_else(ResultSet::empty))
    }

    async fn begin(&mut self) -> QueryResult<()> {
        if self.transaction.is_some() {
            return Err(QueryError::transaction("a transaction is already open"));
        }
        let mut state = self.state.lock();
        state.executed.push("BEGIN".to_string());
        self.transaction = Some(OpenTransaction {
            snapshot: state.tables.clone(),
            statements: Vec::new(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> QueryResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| QueryError::transaction("no transaction is open"))?;
        let mut state = self.state.lock();
        if let Some((_, message)) = state.failures.iter().find(|(p, _)| p == "COMMIT") {
            let message = message.clone();
            state.executed.push("COMMIT".to_string());
            return Err(QueryError::database(message));
        }
        state.executed.push("COMMIT".to_string());
        state.tables = tx.snapshot;
        state.committed.extend(tx.statements);
        Ok(())
    }

    async fn rollback(&mut self) -> QueryResult<()> {
        if self.transaction.take().is_none() {
            return Err(QueryError::transaction("no transaction is open"));
        }
        self.state.lock().executed.push("ROLLBACK".to_string());
        Ok(())
    }

    async fn ping(&mut self) -> bool {
        !self.closed && self.state.lock().ping_ok
    }

    async fn close(&mut self) -> QueryResult<()> {
        if !self.closed {
            self.closed = true;
            self.transaction = None;
            self.state.lock().closed += 1;
        }
        Ok(())
    }
}

/// Apply one statement to the table store.
fn apply(tables: &mut Tables, sql: &str) -> QueryResult<Option<ResultSet>> {
    let upper = sql.trim().to_ascii_uppercase();
    let trimmed = sql.trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let upper_words: Vec<&str> = upper.split_whitespace().collect();

    match upper_words.as_slice() {
        ["CREATE", "TABLE", "IF", "NOT", "EXISTS", ..] => {
            let name = table_name(words.get(5).copied())?;
            tables.entry(name).or_default();
            Ok(None)
        }
        ["CREATE", "TABLE", ..] => {
            let name = table_name(words.get(2).copied())?;
            if tables.contains_key(&name) {
                return Err(QueryError::database(format!("relation \"{}\" already exists", name)));
            }
            tables.insert(name, Vec::new());
            Ok(None)
        }
        ["DROP", "TABLE", "IF", "EXISTS", ..] => {
            tables.remove(&table_name(words.get(4).copied())?);
            Ok(None)
        }
        ["DROP", "TABLE", ..] => {
            let name = table_name(words.get(2).copied())?;
            tables
                .remove(&name)
                .map(|_| None)
                .ok_or_else(|| missing_table(&name))
        }
        ["INSERT", "INTO", ..] => insert(tables, trimmed, &upper).map(Some),
        ["SELECT", ..] if upper.contains(" FROM ") => select(tables, trimmed, &upper).map(Some),
        _ => Ok(None),
    }
}

fn table_name(word: Option<&str>) -> QueryResult<String> {
    let word = word.ok_or_else(|| QueryError::database("syntax error: missing table name"))?;
    let name = word.split('(').next().unwrap_or(word);
    Ok(name.trim_matches('"').to_ascii_lowercase())
}

fn missing_table(name: &str) -> QueryError {
    QueryError::database(format!("relation \"{}\" does not exist", name))
}

/// Split on live commas, trimming each part.
fn split_live_commas(text: &str) -> Vec<String> {
    let mut cuts = Vec::new();
    scanner::scan_silent(text, |pos, ch, _| {
        if ch == ',' {
            cuts.push(pos);
        }
        None
    });
    let mut parts = Vec::new();
    let mut start = 0;
    for end in cuts.into_iter().chain(std::iter::once(text.len())) {
        parts.push(text[start..end].trim().to_string());
        start = end + 1;
    }
    parts
}

/// Text between the first `(` at or after `from` and its closing `)`.
fn parenthesized(sql: &str, from: usize) -> QueryResult<(&str, usize)> {
    let syntax = || QueryError::database(format!("syntax error near: {}", sql));
    let open = sql[from..].find('(').map(|i| from + i).ok_or_else(syntax)?;

    let mut depth = 0usize;
    let mut close = None;
    scanner::scan_silent(&sql[open..], |pos, ch, _| {
        if close.is_none() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + pos);
                    }
                }
                _ => {}
            }
        }
        None
    });
    let close = close.ok_or_else(syntax)?;
    Ok((&sql[open + 1..close], close + 1))
}

fn cell(literal: &str) -> Option<String> {
    if literal.eq_ignore_ascii_case("null") {
        return None;
    }
    let literal = literal.split("::").next().unwrap_or(literal);
    match literal.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => Some(inner.replace("''", "'")),
        None => Some(literal.to_string()),
    }
}

fn insert(tables: &mut Tables, sql: &str, upper: &str) -> QueryResult<ResultSet> {
    let words: Vec<&str> = sql.split_whitespace().collect();
    let name = table_name(words.get(2).copied())?;
    let into_at = upper.find("INTO").map_or(0, |i| i + "INTO".len());

    let (columns, after_columns) = parenthesized(sql, into_at)?;
    let values_at = upper[after_columns..]
        .find("VALUES")
        .map(|i| after_columns + i)
        .ok_or_else(|| QueryError::database("syntax error: INSERT without VALUES"))?;
    let (values, _) = parenthesized(sql, values_at)?;

    let columns = split_live_commas(columns);
    let values = split_live_commas(values);
    if columns.len() != values.len() {
        return Err(QueryError::database(format!(
            "INSERT has {} columns but {} values",
            columns.len(),
            values.len()
        )));
    }

    let rows = tables.get_mut(&name).ok_or_else(|| missing_table(&name))?;
    let record: Record = columns
        .into_iter()
        .map(|c| c.trim_matches('"').to_ascii_lowercase())
        .zip(values.iter().map(|v| cell(v)))
        .collect();
    rows.push(record);

    let mut result = ResultSet::empty();
    result.rows_affected = 1;
    Ok(result)
}

fn select(tables: &Tables, sql: &str, upper: &str) -> QueryResult<ResultSet> {
    let from_at = upper.find(" FROM ").unwrap_or(0);
    let projection = split_live_commas(sql["SELECT".len()..from_at].trim());
    let rest: Vec<&str> = sql[from_at + " FROM ".len()..].split_whitespace().collect();
    let name = table_name(rest.first().copied())?;
    let rows = tables.get(&name).ok_or_else(|| missing_table(&name))?;

    let order_by = upper
        .find(" ORDER BY ")
        .map(|i| sql[i + " ORDER BY ".len()..].split_whitespace().next().unwrap_or(""))
        .map(str::to_ascii_lowercase);

    let mut sorted: Vec<&Record> = rows.iter().collect();
    if let Some(key) = &order_by {
        sorted.sort_by_key(|row| {
            row.get(key)
                .and_then(|v| v.as_deref())
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(i64::MAX)
        });
    }

    let names: Vec<String> = projection.iter().map(|c| c.to_ascii_lowercase()).collect();
    let columns = names
        .iter()
        .enumerate()
        .map(|(i, n)| Column::new(i, n.clone(), SqlType::Text))
        .collect();
    let mut result = ResultSet::new(columns);
    for row in sorted {
        let cells = names
            .iter()
            .map(|n| row.get(n).cloned().flatten())
            .collect();
        result.push_row(cells)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_table_store() {
        let driver = MemoryDriver::new();
        let mut conn = driver.connect().await.unwrap();

        conn.execute("CREATE TABLE IF NOT EXISTS hist (version BIGINT, name TEXT)")
            .await
            .unwrap();
        conn.execute("INSERT INTO hist (version, name) VALUES (2, 'b, c')")
            .await
            .unwrap();
        conn.execute("INSERT INTO hist (version, name) VALUES (1, 'O''Brien')")
            .await
            .unwrap();

        let rs = conn
            .fetch_all("SELECT version, name FROM hist ORDER BY version")
            .await
            .unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows()[0].get_i64("version").unwrap(), 1);
        assert_eq!(rs.rows()[0].get_str("name").unwrap(), "O'Brien");
        assert_eq!(rs.rows()[1].get_str("name").unwrap(), "b, c");
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards() {
        let driver = MemoryDriver::new();
        let mut conn = driver.connect().await.unwrap();

        conn.begin().await.unwrap();
        conn.execute("CREATE TABLE t (id INT)").await.unwrap();
        assert!(!driver.table_exists("t"));
        conn.rollback().await.unwrap();
        assert!(!driver.table_exists("t"));

        conn.begin().await.unwrap();
        conn.execute("CREATE TABLE t (id INT)").await.unwrap();
        conn.commit().await.unwrap();
        assert!(driver.table_exists("t"));
        assert_eq!(driver.committed(), vec!["CREATE TABLE t (id INT)".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let driver = MemoryDriver::new();
        driver.fail_next_connects(1);
        assert!(driver.connect().await.is_err());

        let mut conn = driver.connect().await.unwrap();
        driver.fail_on("boom", "scripted");
        let err = conn.execute("select boom").await.unwrap_err();
        assert!(err.message.contains("scripted"));

        driver.set_ping(false);
        assert!(!conn.ping().await);
        conn.close().await.unwrap();
        assert_eq!(driver.connections_closed(), 1);
        assert!(conn.execute("select 1").await.is_err());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let driver = MemoryDriver::new();
        let mut conn = driver.connect().await.unwrap();
        conn.execute("CREATE TABLE users (id INT)").await.unwrap();
        assert!(conn.execute("CREATE TABLE users (id INT)").await.is_err());
        assert!(conn.fetch_all("SELECT id FROM missing").await.is_err());
    }
}
