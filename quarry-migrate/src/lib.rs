//! # quarry-migrate
//!
//! Versioned SQL migrations for Quarry.
//!
//! This crate provides:
//! - Discovery of `<version>_<name>.sql` files with duplicate and gap checks
//! - SHA-256 checksums that detect edits to applied files
//! - A history table recording every applied file
//! - Transactional, file-at-a-time application with observer hooks
//!
//! ## Migration Files
//!
//! ```text
//! migrations/
//! ├── 1_create_users.sql
//! ├── 2_add_email.sql
//! └── 3_backfill_email.sql
//! ```
//!
//! Each file may contain several statements separated by `;`. Semicolons
//! inside string literals, quoted identifiers, comments and dollar-quoted
//! bodies do not end a statement.
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarry_migrate::{MigrationConfig, Migrator};
//!
//! let migrator = Migrator::new(MigrationConfig::new().migrations_dir("./migrations"))?
//!     .after_file(|file, record| {
//!         tracing::info!(version = file.version, ms = record.execution_time_ms, "migrated");
//!         Ok(())
//!     });
//!
//! let report = migrator.run(&pool).await?;
//! println!("{}", report.summary());
//! ```
//!
//! Running the same directory again applies nothing. Editing a file after it
//! was applied makes the next run fail with
//! [`MigrationError::ChecksumMismatch`].

pub mod engine;
pub mod error;
pub mod file;
pub mod history;

// Re-exports
pub use engine::{
    ChecksumMismatch, HookError, MigrationConfig, MigrationHook, MigrationReport, MigrationStatus,
    Migrator,
};
pub use error::{MigrateResult, MigrationError};
pub use file::{MigrationFile, MigrationFileManager, compute_checksum};
pub use history::{DEFAULT_HISTORY_TABLE, HistoryTable, Migration};
