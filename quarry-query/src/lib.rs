//! # quarry-query
//!
//! SQL scanning, statement rendering and connection pooling for Quarry.
//!
//! This crate provides:
//! - A quote- and comment-aware SQL scanner (`scanner`)
//! - Statements with named (`:name`) and positional (`?`, `$n`) placeholders
//!   rendered to escaped literal SQL or native driver form (`statement`)
//! - A registry of encoders for application value types (`encoder`)
//! - A bounded, async connection pool over any driver (`pool`)
//! - Transactions with savepoints (`transaction`)
//! - A per-client notification registry (`notify`)
//!
//! ## Statements
//!
//! ```rust
//! use quarry_query::{Statement, ValueEncoderRegistry};
//!
//! let mut stmt = Statement::new("select * from t where name = ? and id = :id");
//! stmt.bind(0, "O'Brien").unwrap();
//! stmt.bind_named("id", 5).unwrap();
//!
//! let sql = stmt.render(&ValueEncoderRegistry::new()).unwrap();
//! assert_eq!(sql, "select * from t where name = 'O''Brien' and id = 5");
//! ```
//!
//! Placeholder-looking text inside quotes and comments is left alone:
//!
//! ```rust
//! use quarry_query::{Statement, ValueEncoderRegistry};
//!
//! let stmt = Statement::new("select ':not_a_param', x::int -- :nor_this");
//! assert_eq!(stmt.parameter_names().count(), 0);
//! assert_eq!(
//!     stmt.render(&ValueEncoderRegistry::new()).unwrap(),
//!     "select ':not_a_param', x::int -- :nor_this"
//! );
//! ```
//!
//! ## Pooling
//!
//! Drivers implement [`connection::ConnectionFactory`] and
//! [`connection::RawConnection`]; the pool and the [`Database`] client work
//! over any such driver.
//!
//! ```rust,ignore
//! use quarry_query::{Database, DatabaseType, PoolOptions, Statement};
//!
//! let db = Database::connect(driver, DatabaseType::PostgreSQL, PoolOptions::new()).await?;
//! let mut stmt = Statement::new("update users set active = :active where id = :id");
//! stmt.bind_named("active", true)?.bind_named("id", 7)?;
//! db.execute(&stmt).await?;
//! db.close().await;
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod notify;
pub mod pool;
pub mod row;
pub mod scanner;
pub mod sql;
pub mod statement;
pub mod transaction;
pub mod value;

pub use client::{Database, DatabaseTransaction};
pub use config::{DatabaseSection, MigrationsSection, PoolSection, QuarryConfig};
pub use connection::{ConnectionFactory, PoolOptions, RawConnection};
pub use encoder::{ValueEncoder, ValueEncoderRegistry};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use notify::{ChannelRegistry, Notification, Subscription};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use row::{Column, ColumnIndex, FromRow, ResultSet, Row};
pub use sql::DatabaseType;
pub use statement::Statement;
pub use transaction::Transaction;
pub use value::{CustomValue, SqlType, Value};

// Re-export logging utilities
pub use logging::{init as init_logging, init_with_level, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Database, DatabaseTransaction};
    pub use crate::connection::{ConnectionFactory, PoolOptions, RawConnection};
    pub use crate::encoder::ValueEncoderRegistry;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::pool::{ConnectionPool, PooledConnection};
    pub use crate::row::{FromRow, ResultSet, Row};
    pub use crate::sql::DatabaseType;
    pub use crate::statement::Statement;
    pub use crate::value::{SqlType, Value};
}
