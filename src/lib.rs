//! # Quarry
//!
//! A pooled SQL client runtime.
//!
//! Quarry provides:
//! - Statements with named and positional placeholders, rendered with every
//!   value escaped, never spliced
//! - A bounded async connection pool over any driver
//! - Versioned SQL migrations with checksum verification
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quarry::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = QuarryConfig::from_file("quarry.toml")?;
//!     let db = Database::connect(driver, config.database.dialect, config.pool_options()?).await?;
//!
//!     let migrator = Migrator::new(MigrationConfig::from_section(
//!         &config.migrations,
//!         config.database.dialect,
//!     ))?;
//!     migrator.run(db.pool()).await?;
//!
//!     let mut stmt = Statement::new("select id, email from users where email = :email");
//!     stmt.bind_named("email", "ada@example.com")?;
//!     let rows = db.fetch_all(&stmt).await?;
//!
//!     db.close().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Statements, pooling and the client.
pub mod query {
    pub use quarry_query::*;
}

/// Versioned migrations.
pub mod migrate {
    pub use quarry_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use quarry_migrate::{MigrationConfig, MigrationError, Migrator};
    pub use quarry_query::prelude::*;
    pub use quarry_query::{QuarryConfig, Transaction};
}

// Re-export key types at the crate root
pub use quarry_migrate::{MigrationError, Migrator};
pub use quarry_query::{Database, QueryError, Statement, Value};
