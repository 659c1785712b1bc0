//! Migration engine implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use quarry_query::{
    ConnectionFactory, ConnectionPool, DatabaseType, MigrationsSection, PooledConnection,
    Transaction,
};
use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::file::{MigrationFile, MigrationFileManager};
use crate::history::{DEFAULT_HISTORY_TABLE, HistoryTable, Migration};

/// Configuration for the migration engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// History table name.
    pub table: String,
    /// Reject gaps between consecutive versions.
    pub strict_sequence: bool,
    /// Dialect used to render history rows.
    pub dialect: DatabaseType,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            table: DEFAULT_HISTORY_TABLE.to_string(),
            strict_sequence: true,
            dialect: DatabaseType::default(),
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[migrations]` table of `quarry.toml`.
    pub fn from_section(section: &MigrationsSection, dialect: DatabaseType) -> Self {
        Self {
            migrations_dir: PathBuf::from(&section.directory),
            table: section.table.clone(),
            strict_sequence: section.strict_sequence,
            dialect,
        }
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the history table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Require versions to increase by exactly one.
    pub fn strict_sequence(mut self, strict: bool) -> Self {
        self.strict_sequence = strict;
        self
    }

    /// Set the dialect.
    pub fn dialect(mut self, dialect: DatabaseType) -> Self {
        self.dialect = dialect;
        self
    }
}

/// Error type hooks return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Observer invoked while migrations are applied.
///
/// An error from either method aborts the run and rolls back the file that
/// is being applied.
pub trait MigrationHook: Send + Sync {
    /// Called after each statement succeeds.
    fn after_statement(
        &self,
        _file: &MigrationFile,
        _index: usize,
        _sql: &str,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after a file's statements ran and its history row was
    /// written, before commit.
    fn after_file(&self, _file: &MigrationFile, _record: &Migration) -> Result<(), HookError> {
        Ok(())
    }
}

struct AfterStatement<F>(F);

impl<F> MigrationHook for AfterStatement<F>
where
    F: Fn(&MigrationFile, usize, &str) -> Result<(), HookError> + Send + Sync,
{
    fn after_statement(&self, file: &MigrationFile, index: usize, sql: &str) -> Result<(), HookError> {
        (self.0)(file, index, sql)
    }
}

struct AfterFile<F>(F);

impl<F> MigrationHook for AfterFile<F>
where
    F: Fn(&MigrationFile, &Migration) -> Result<(), HookError> + Send + Sync,
{
    fn after_file(&self, file: &MigrationFile, record: &Migration) -> Result<(), HookError> {
        (self.0)(file, record)
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Migrations applied by this run, in order.
    pub applied: Vec<Migration>,
    /// Files that were already applied with a matching checksum.
    pub skipped: usize,
    /// Wall time of the run.
    pub duration: Duration,
    /// Non-fatal findings, such as history rows without a file.
    pub warnings: Vec<String>,
}

impl MigrationReport {
    /// Whether anything was applied.
    pub fn has_changes(&self) -> bool {
        !self.applied.is_empty()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        if self.applied.is_empty() {
            return format!("No migrations applied ({} up to date)", self.skipped);
        }
        format!(
            "{} applied, {} skipped in {}ms",
            self.applied.len(),
            self.skipped,
            self.duration.as_millis()
        )
    }
}

/// An applied migration whose file changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    /// Migration version.
    pub version: u64,
    /// Migration name.
    pub name: String,
    /// Recorded checksum.
    pub expected: String,
    /// Checksum of the file on disk.
    pub actual: String,
}

/// Migration status information.
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    /// Applied migrations, by version.
    pub applied: Vec<Migration>,
    /// Files not applied yet, by version.
    pub pending: Vec<MigrationFile>,
    /// Applied files edited since they were recorded.
    pub modified: Vec<ChecksumMismatch>,
    /// History rows with no file on disk.
    pub orphaned: Vec<Migration>,
}

impl MigrationStatus {
    /// Nothing pending and nothing modified.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && self.modified.is_empty()
    }
}

/// The migration engine.
pub struct Migrator {
    config: MigrationConfig,
    file_manager: MigrationFileManager,
    table: HistoryTable,
    hooks: Vec<Arc<dyn MigrationHook>>,
}

impl Migrator {
    /// Create a migrator, validating the configuration.
    pub fn new(config: MigrationConfig) -> MigrateResult<Self> {
        let table = HistoryTable::new(config.table.clone(), config.dialect)?;
        Ok(Self {
            file_manager: MigrationFileManager::new(&config.migrations_dir),
            table,
            config,
            hooks: Vec::new(),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Register a hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: impl MigrationHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Register a callback run after each statement.
    pub fn after_statement<F>(self, callback: F) -> Self
    where
        F: Fn(&MigrationFile, usize, &str) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.with_hook(AfterStatement(callback))
    }

    /// Register a callback run after each file, before its commit.
    pub fn after_file<F>(self, callback: F) -> Self
    where
        F: Fn(&MigrationFile, &Migration) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.with_hook(AfterFile(callback))
    }

    /// Discover the migration files.
    pub async fn files(&self) -> MigrateResult<Vec<MigrationFile>> {
        self.file_manager
            .list_migrations(self.config.strict_sequence)
            .await
    }

    /// Apply every pending migration.
    ///
    /// Each file runs in its own transaction. The first failure rolls that
    /// file back and ends the run; files applied before it stay applied.
    pub async fn run<F: ConnectionFactory>(
        &self,
        pool: &ConnectionPool<F>,
    ) -> MigrateResult<MigrationReport> {
        let files = self.files().await?;
        let mut conn = pool.acquire().await?;
        let outcome = self.run_on(&mut conn, &files).await;
        let released = conn.close().await;
        let report = outcome?;
        released?;
        Ok(report)
    }

    async fn run_on<F: ConnectionFactory>(
        &self,
        conn: &mut PooledConnection<F>,
        files: &[MigrationFile],
    ) -> MigrateResult<MigrationReport> {
        let start = Instant::now();
        let mut report = MigrationReport::default();

        self.table.ensure(conn).await?;
        let applied: BTreeMap<u64, Migration> = self
            .table
            .applied(conn)
            .await?
            .into_iter()
            .map(|m| (m.version, m))
            .collect();

        for orphan in orphaned(&applied, files) {
            warn!(
                version = orphan.version,
                name = %orphan.name,
                "Applied migration has no file on disk"
            );
            report.warnings.push(format!(
                "Migration {} ({}) is recorded as applied but has no file",
                orphan.version, orphan.name
            ));
        }

        for file in files {
            if let Some(record) = applied.get(&file.version) {
                if record.checksum != file.checksum {
                    return Err(MigrationError::ChecksumMismatch {
                        version: file.version,
                        name: file.name.clone(),
                        expected: record.checksum.clone(),
                        actual: file.checksum.clone(),
                    });
                }
                debug!(version = file.version, "Migration already applied");
                report.skipped += 1;
                continue;
            }

            let record = self.apply(conn, file).await?;
            info!(
                version = record.version,
                name = %record.name,
                execution_time_ms = record.execution_time_ms,
                "Applied migration"
            );
            report.applied.push(record);
        }

        report.duration = start.elapsed();
        info!(summary = %report.summary(), "Migration run finished");
        Ok(report)
    }

    /// Apply one file inside a transaction.
    async fn apply<F: ConnectionFactory>(
        &self,
        conn: &mut PooledConnection<F>,
        file: &MigrationFile,
    ) -> MigrateResult<Migration> {
        let statements = file.statements();
        if statements.is_empty() {
            return Err(MigrationError::EmptyMigration {
                version: file.version,
                name: file.name.clone(),
            });
        }

        let mut tx = conn.begin().await?;
        match self.apply_in(&mut tx, file, &statements).await {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(e) => {
                warn!(version = file.version, error = %e, "Rolling back migration");
                if let Err(rollback) = tx.rollback().await {
                    warn!(version = file.version, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn apply_in<F: ConnectionFactory>(
        &self,
        tx: &mut Transaction<'_, F>,
        file: &MigrationFile,
        statements: &[String],
    ) -> MigrateResult<Migration> {
        let started = Instant::now();
        for (index, sql) in statements.iter().enumerate() {
            tx.execute(sql)
                .await
                .map_err(|source| MigrationError::StatementFailed {
                    version: file.version,
                    name: file.name.clone(),
                    statement_index: index,
                    source,
                })?;
            for hook in &self.hooks {
                hook.after_statement(file, index, sql)
                    .map_err(|e| MigrationError::hook(file.version, e.to_string()))?;
            }
        }

        let record = Migration {
            version: file.version,
            name: file.name.clone(),
            installed_on: Utc::now(),
            checksum: file.checksum.clone(),
            execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.table.record(tx, &record).await?;

        for hook in &self.hooks {
            hook.after_file(file, &record)
                .map_err(|e| MigrationError::hook(file.version, e.to_string()))?;
        }
        Ok(record)
    }

    /// Compare the directory with the history table without applying anything.
    pub async fn status<F: ConnectionFactory>(
        &self,
        pool: &ConnectionPool<F>,
    ) -> MigrateResult<MigrationStatus> {
        let files = self.files().await?;
        let mut conn = pool.acquire().await?;
        let outcome = async {
            self.table.ensure(&mut conn).await?;
            self.table.applied(&mut conn).await
        }
        .await;
        let released = conn.close().await;
        let applied = outcome?;
        released?;

        let by_version: BTreeMap<u64, Migration> =
            applied.iter().cloned().map(|m| (m.version, m)).collect();
        let mut status = MigrationStatus {
            orphaned: orphaned(&by_version, &files).cloned().collect(),
            applied,
            ..MigrationStatus::default()
        };

        for file in files {
            match by_version.get(&file.version) {
                Some(record) if record.checksum != file.checksum => {
                    status.modified.push(ChecksumMismatch {
                        version: file.version,
                        name: file.name.clone(),
                        expected: record.checksum.clone(),
                        actual: file.checksum.clone(),
                    });
                }
                Some(_) => {}
                None => status.pending.push(file),
            }
        }
        Ok(status)
    }
}

fn orphaned<'a>(
    applied: &'a BTreeMap<u64, Migration>,
    files: &'a [MigrationFile],
) -> impl Iterator<Item = &'a Migration> + 'a {
    applied
        .values()
        .filter(move |m| !files.iter().any(|f| f.version == m.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::PoolOptions;
    use quarry_query::connection::testing::MemoryDriver;

    fn write(dir: &std::path::Path, name: &str, sql: &str) {
        std::fs::write(dir.join(name), sql).unwrap();
    }

    async fn setup() -> (tempfile::TempDir, MemoryDriver, ConnectionPool<MemoryDriver>) {
        let dir = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::new();
        let pool = ConnectionPool::connect(driver.clone(), PoolOptions::development())
            .await
            .unwrap();
        (dir, driver, pool)
    }

    fn migrator(dir: &tempfile::TempDir) -> Migrator {
        Migrator::new(MigrationConfig::new().migrations_dir(dir.path())).unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = MigrationConfig::new()
            .migrations_dir("./db")
            .table("history")
            .strict_sequence(false)
            .dialect(DatabaseType::SQLite);
        assert_eq!(config.migrations_dir, PathBuf::from("./db"));
        assert_eq!(config.table, "history");
        assert!(!config.strict_sequence);
        assert_eq!(config.dialect, DatabaseType::SQLite);

        let from_section =
            MigrationConfig::from_section(&MigrationsSection::default(), DatabaseType::MySQL);
        assert_eq!(from_section.table, DEFAULT_HISTORY_TABLE);
        assert!(from_section.strict_sequence);
    }

    #[test]
    fn test_invalid_table_rejected() {
        let err = Migrator::new(MigrationConfig::new().table("bad name")).err().unwrap();
        assert!(matches!(err, MigrationError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_run_applies_then_skips() {
        let (dir, driver, pool) = setup().await;
        write(dir.path(), "1_init.sql", "CREATE TABLE users (id BIGINT);");
        write(
            dir.path(),
            "2_seed.sql",
            "INSERT INTO users (id) VALUES (1);\nINSERT INTO users (id) VALUES (2);",
        );
        let migrator = migrator(&dir);

        let report = migrator.run(&pool).await.unwrap();
        let versions: Vec<u64> = report.applied.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(driver.rows("users").len(), 2);
        assert_eq!(driver.rows(DEFAULT_HISTORY_TABLE).len(), 2);

        let again = migrator.run(&pool).await.unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.skipped, 2);
        assert_eq!(driver.rows("users").len(), 2);
        assert_eq!(pool.pool_in_use(), 0);
    }

    #[tokio::test]
    async fn test_failed_statement_rolls_back_file() {
        let (dir, driver, pool) = setup().await;
        write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
        write(dir.path(), "2_broken.sql", "CREATE TABLE b (id INT);\nSELECT boom;");
        write(dir.path(), "3_later.sql", "CREATE TABLE c (id INT);");
        driver.fail_on("boom", "syntax error at boom");

        let err = migrator(&dir).run(&pool).await.unwrap_err();
        match err {
            MigrationError::StatementFailed {
                version,
                statement_index,
                ..
            } => {
                assert_eq!(version, 2);
                assert_eq!(statement_index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(driver.table_exists("a"));
        assert!(!driver.table_exists("b"));
        assert!(!driver.table_exists("c"));
        assert_eq!(driver.rows(DEFAULT_HISTORY_TABLE).len(), 1);
        assert_eq!(pool.pool_in_use(), 0);
    }

    #[tokio::test]
    async fn test_empty_file_fails() {
        let (dir, _driver, pool) = setup().await;
        write(dir.path(), "1_empty.sql", "-- nothing here;\n/* still nothing */\n");

        let err = migrator(&dir).run(&pool).await.unwrap_err();
        assert!(matches!(err, MigrationError::EmptyMigration { version: 1, .. }));
    }

    #[tokio::test]
    async fn test_hooks_run_and_abort() {
        let (dir, driver, pool) = setup().await;
        write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);");

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let migrator = migrator(&dir)
            .after_statement(move |file, index, _sql| {
                recorder.lock().unwrap().push((file.version, index));
                Ok(())
            })
            .after_file(|file, _record| Err(format!("reject {}", file.name).into()));

        let err = migrator.run(&pool).await.unwrap_err();
        assert!(matches!(err, MigrationError::Hook { version: 1, .. }));
        assert_eq!(*seen.lock().unwrap(), vec![(1, 0), (1, 1)]);
        assert!(!driver.table_exists("a"));
        assert!(driver.rows(DEFAULT_HISTORY_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_status_reports_pending_modified_and_orphaned() {
        let (dir, driver, pool) = setup().await;
        write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
        write(dir.path(), "2_more.sql", "CREATE TABLE b (id INT);");
        let migrator = migrator(&dir);
        migrator.run(&pool).await.unwrap();

        write(dir.path(), "3_next.sql", "CREATE TABLE c (id INT);");
        driver.update_cell(DEFAULT_HISTORY_TABLE, "version", "1", "checksum", "stale");
        std::fs::remove_file(dir.path().join("2_more.sql")).unwrap();

        let relaxed = Migrator::new(
            MigrationConfig::new()
                .migrations_dir(dir.path())
                .strict_sequence(false),
        )
        .unwrap();
        let status = relaxed.status(&pool).await.unwrap();
        assert_eq!(status.applied.len(), 2);
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.pending[0].version, 3);
        assert_eq!(status.modified.len(), 1);
        assert_eq!(status.modified[0].expected, "stale");
        assert_eq!(status.orphaned.len(), 1);
        assert_eq!(status.orphaned[0].version, 2);
        assert!(!status.is_up_to_date());
        assert!(!driver.table_exists("c"));
    }

    #[tokio::test]
    async fn test_orphaned_rows_warn() {
        let (dir, _driver, pool) = setup().await;
        write(dir.path(), "1_init.sql", "CREATE TABLE a (id INT);");
        write(dir.path(), "2_more.sql", "CREATE TABLE b (id INT);");
        migrator(&dir).run(&pool).await.unwrap();

        std::fs::remove_file(dir.path().join("2_more.sql")).unwrap();
        let report = migrator(&dir).run(&pool).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("2 (more)"));
    }

    #[test]
    fn test_report_summary() {
        let report = MigrationReport {
            skipped: 3,
            ..MigrationReport::default()
        };
        assert!(!report.has_changes());
        assert_eq!(report.summary(), "No migrations applied (3 up to date)");
    }
}
