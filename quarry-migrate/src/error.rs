//! Error types for the migration engine.

use std::path::PathBuf;

use quarry_query::QueryError;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A `.sql` file whose name is not `<version>_<name>.sql`.
    #[error("Invalid migration file name '{0}': expected <version>_<name>.sql")]
    InvalidFileName(String),

    /// Two files share a version.
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// Shared version.
        version: u64,
        /// First file seen.
        first: String,
        /// Second file seen.
        second: String,
    },

    /// Consecutive versions differ by more than one.
    #[error("Non-contiguous migration versions: {previous} is followed by {next}")]
    NonContiguousVersion {
        /// Lower version.
        previous: u64,
        /// Next version found on disk.
        next: u64,
    },

    /// An applied migration was edited after it was recorded.
    #[error(
        "Checksum mismatch for migration {version} ({name}): recorded {expected}, file has {actual}"
    )]
    ChecksumMismatch {
        /// Migration version.
        version: u64,
        /// Migration name.
        name: String,
        /// Checksum stored in the history table.
        expected: String,
        /// Checksum of the file on disk.
        actual: String,
    },

    /// A migration file contains no statements.
    #[error("Migration {version} ({name}) contains no statements")]
    EmptyMigration {
        /// Migration version.
        version: u64,
        /// Migration name.
        name: String,
    },

    /// A statement failed; the file was rolled back.
    #[error("Migration {version} ({name}) failed at statement {statement_index}: {source}")]
    StatementFailed {
        /// Migration version.
        version: u64,
        /// Migration name.
        name: String,
        /// Zero-based index of the failing statement.
        statement_index: usize,
        /// Driver error.
        #[source]
        source: QueryError,
    },

    /// A hook returned an error; the file was rolled back.
    #[error("Hook failed during migration {version}: {message}")]
    Hook {
        /// Migration version.
        version: u64,
        /// Hook message.
        message: String,
    },

    /// A history row could not be decoded.
    #[error("Malformed migration history: {0}")]
    History(String),

    /// Pool, transaction or driver error outside a migration statement.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Invalid engine configuration.
    #[error("Invalid migration configuration: {0}")]
    InvalidConfiguration(String),
}

impl MigrationError {
    /// Create an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a hook error.
    pub fn hook(version: u64, message: impl Into<String>) -> Self {
        Self::Hook {
            version,
            message: message.into(),
        }
    }

    /// Create a history error.
    pub fn history(message: impl Into<String>) -> Self {
        Self::History(message.into())
    }

    /// The migration version this error concerns, if any.
    pub fn version(&self) -> Option<u64> {
        match self {
            Self::DuplicateVersion { version, .. }
            | Self::ChecksumMismatch { version, .. }
            | Self::EmptyMigration { version, .. }
            | Self::StatementFailed { version, .. }
            | Self::Hook { version, .. } => Some(*version),
            Self::NonContiguousVersion { next, .. } => Some(*next),
            _ => None,
        }
    }

    /// Whether the migration directory itself is malformed.
    pub fn is_discovery_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFileName(_) | Self::DuplicateVersion { .. } | Self::NonContiguousVersion { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_display() {
        let err = MigrationError::ChecksumMismatch {
            version: 1,
            name: "init".to_string(),
            expected: "abc".to_string(),
            actual: "xyz".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("xyz"));
        assert!(msg.contains("init"));
        assert_eq!(err.version(), Some(1));
    }

    #[test]
    fn test_statement_failed_keeps_source() {
        let err = MigrationError::StatementFailed {
            version: 2,
            name: "add_col".to_string(),
            statement_index: 1,
            source: QueryError::database("syntax error"),
        };
        assert!(err.to_string().contains("statement 1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_discovery_errors() {
        assert!(MigrationError::NonContiguousVersion { previous: 1, next: 3 }.is_discovery_error());
        assert!(!MigrationError::history("bad row").is_discovery_error());
    }
}
