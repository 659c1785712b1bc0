//! Migration history table.
//!
//! Every applied file gets one row:
//!
//! | column | type |
//! |--------|------|
//! | `version` | `BIGINT PRIMARY KEY` |
//! | `name` | `TEXT NOT NULL` |
//! | `installed_on` | `TIMESTAMP NOT NULL` |
//! | `checksum` | `TEXT NOT NULL` |
//! | `execution_time_ms` | `BIGINT NOT NULL` |

use chrono::{DateTime, NaiveDateTime, Utc};
use quarry_query::{
    ConnectionFactory, DatabaseType, PooledConnection, ResultSet, Row, Statement, Transaction,
    ValueEncoderRegistry, sql::is_plain_identifier,
};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Default history table name.
pub const DEFAULT_HISTORY_TABLE: &str = "_quarry_migrations";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Migration version.
    pub version: u64,
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub installed_on: DateTime<Utc>,
    /// Checksum of the file content at apply time.
    pub checksum: String,
    /// Time spent executing the file's statements.
    pub execution_time_ms: u64,
}

/// SQL for the history table of one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTable {
    name: String,
    dialect: DatabaseType,
}

impl HistoryTable {
    /// Validate the table name.
    pub fn new(name: impl Into<String>, dialect: DatabaseType) -> MigrateResult<Self> {
        let name = name.into();
        if !is_plain_identifier(&name) {
            return Err(MigrationError::InvalidConfiguration(format!(
                "history table name '{}' must be a plain identifier",
                name
            )));
        }
        Ok(Self { name, dialect })
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idempotent create statement.
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT PRIMARY KEY, name TEXT NOT NULL, \
             installed_on TIMESTAMP NOT NULL, checksum TEXT NOT NULL, \
             execution_time_ms BIGINT NOT NULL)",
            self.name
        )
    }

    /// Select every applied record, ordered by version.
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT version, name, installed_on, checksum, execution_time_ms FROM {} ORDER BY version",
            self.name
        )
    }

    /// Rendered insert for one record.
    pub fn insert_sql(&self, record: &Migration) -> MigrateResult<String> {
        let mut stmt = Statement::new(format!(
            "INSERT INTO {} (version, name, installed_on, checksum, execution_time_ms) \
             VALUES (:version, :name, :installed_on, :checksum, :execution_time_ms)",
            self.name
        ));
        stmt.bind_named("version", to_i64(record.version)?)?
            .bind_named("name", record.name.as_str())?
            .bind_named("installed_on", record.installed_on.naive_utc())?
            .bind_named("checksum", record.checksum.as_str())?
            .bind_named("execution_time_ms", to_i64(record.execution_time_ms)?)?;
        Ok(stmt.render_dialect(self.dialect, &ValueEncoderRegistry::new())?)
    }

    /// Create the table if needed.
    pub async fn ensure<F: ConnectionFactory>(
        &self,
        conn: &mut PooledConnection<F>,
    ) -> MigrateResult<()> {
        conn.execute(&self.create_sql()).await?;
        Ok(())
    }

    /// Read every applied record.
    pub async fn applied<F: ConnectionFactory>(
        &self,
        conn: &mut PooledConnection<F>,
    ) -> MigrateResult<Vec<Migration>> {
        let rows = conn.fetch_all(&self.select_sql()).await?;
        decode_records(&rows)
    }

    /// Record an applied migration inside the file's transaction.
    pub async fn record<F: ConnectionFactory>(
        &self,
        tx: &mut Transaction<'_, F>,
        record: &Migration,
    ) -> MigrateResult<()> {
        tx.execute(&self.insert_sql(record)?).await?;
        Ok(())
    }
}

fn to_i64(value: u64) -> MigrateResult<i64> {
    i64::try_from(value)
        .map_err(|_| MigrationError::InvalidConfiguration(format!("{} does not fit in BIGINT", value)))
}

fn decode_records(rows: &ResultSet) -> MigrateResult<Vec<Migration>> {
    rows.iter().map(decode_record).collect()
}

fn decode_record(row: &Row) -> MigrateResult<Migration> {
    let malformed = |e: quarry_query::QueryError| MigrationError::history(e.to_string());
    let version: u64 = row.get("version").map_err(malformed)?;
    let installed_on = row.get_str("installed_on").map_err(malformed)?;

    Ok(Migration {
        version,
        name: row.get_str("name").map_err(malformed)?.to_string(),
        installed_on: parse_timestamp(installed_on).ok_or_else(|| {
            MigrationError::history(format!(
                "version {}: unreadable installed_on '{}'",
                version, installed_on
            ))
        })?,
        checksum: row.get_str("checksum").map_err(malformed)?.to_string(),
        execution_time_ms: row.get("execution_time_ms").map_err(malformed)?,
    })
}

/// Accept RFC 3339 and the plain `YYYY-MM-DD HH:MM:SS[.f]` form drivers return.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}
