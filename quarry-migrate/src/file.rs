//! Migration files and directory discovery.
//!
//! A migration is a single file named `<version>_<name>.sql`, for example
//! `1_init.sql` or `0042_add-users.email.sql`:
//!
//! ```text
//! migrations/
//! ├── 1_init.sql
//! ├── 2_add_users.sql
//! └── 3_backfill.sql
//! ```

use std::path::{Path, PathBuf};

use quarry_query::scanner;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{MigrateResult, MigrationError};

const FILE_NAME_PATTERN: &str = r"^\s*(\d+)_([A-Za-z0-9._-]+)\.sql\s*$";

/// A migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    /// Path to the file.
    pub path: PathBuf,
    /// Version parsed from the file name.
    pub version: u64,
    /// Description part of the file name.
    pub name: String,
    /// File content.
    pub sql: String,
    /// Hex SHA-256 of the content.
    pub checksum: String,
}

impl MigrationFile {
    /// Build a migration from its parts, computing the checksum.
    pub fn new(version: u64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            path: PathBuf::new(),
            version,
            name: name.into(),
            checksum: compute_checksum(&sql),
            sql,
        }
    }

    /// Set the path for this migration file.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// The statements of this file, in order.
    ///
    /// Semicolons inside literals, quoted identifiers, comments and
    /// dollar-quoted bodies do not split.
    pub fn statements(&self) -> Vec<String> {
        scanner::split_statements(&self.sql)
    }

    /// `<version>_<name>.sql`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.sql", self.version, self.name)
    }
}

/// Hex-encoded SHA-256 of migration content.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn file_name_regex() -> MigrateResult<Regex> {
    Regex::new(FILE_NAME_PATTERN)
        .map_err(|e| MigrationError::InvalidConfiguration(format!("file name pattern: {}", e)))
}

/// Parse a file name into `(version, name)`.
///
/// Returns `Ok(None)` for files that are not `.sql` files at all.
pub fn parse_file_name(file_name: &str) -> MigrateResult<Option<(u64, String)>> {
    parse_with(&file_name_regex()?, file_name)
}

fn parse_with(re: &Regex, file_name: &str) -> MigrateResult<Option<(u64, String)>> {
    if !file_name.trim_end().ends_with(".sql") {
        return Ok(None);
    }
    let invalid = || MigrationError::InvalidFileName(file_name.to_string());
    let caps = re.captures(file_name).ok_or_else(invalid)?;
    let version: u64 = caps[1].parse().map_err(|_| invalid())?;
    Ok(Some((version, caps[2].to_string())))
}

/// Check ordering rules on files sorted by version.
///
/// Duplicates are always rejected. With `strict_sequence`, each version
/// must be exactly one more than the previous one.
pub fn check_sequence(files: &[MigrationFile], strict_sequence: bool) -> MigrateResult<()> {
    for pair in files.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.version == next.version {
            return Err(MigrationError::DuplicateVersion {
                version: next.version,
                first: prev.file_name(),
                second: next.file_name(),
            });
        }
        if strict_sequence && next.version - prev.version > 1 {
            return Err(MigrationError::NonContiguousVersion {
                previous: prev.version,
                next: next.version,
            });
        }
    }
    Ok(())
}

/// Reads migration files from a directory.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Discover every migration file, sorted by version.
    ///
    /// A missing directory yields no migrations. Directories and non-`.sql`
    /// entries are ignored; a malformed `.sql` name fails the whole call.
    pub async fn list_migrations(&self, strict_sequence: bool) -> MigrateResult<Vec<MigrationFile>> {
        let dir = &self.migrations_dir;
        if !tokio::fs::try_exists(dir)
            .await
            .map_err(|e| MigrationError::io(dir, e))?
        {
            warn!(dir = %dir.display(), "Migrations directory does not exist");
            return Ok(Vec::new());
        }

        let re = file_name_regex()?;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| MigrationError::io(dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MigrationError::io(dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| MigrationError::io(&path, e))?;
            if file_type.is_dir() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((version, name)) = parse_with(&re, file_name)? else {
                continue;
            };

            let sql = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| MigrationError::io(&path, e))?;
            files.push(MigrationFile::new(version, name, sql).with_path(path));
        }

        files.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)));
        check_sequence(&files, strict_sequence)?;
        debug!(count = files.len(), dir = %dir.display(), "Discovered migration files");
        Ok(files)
    }
}
