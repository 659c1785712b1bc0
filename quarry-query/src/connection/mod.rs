//! The driver boundary.
//!
//! Quarry does not speak any wire protocol itself. A driver supplies a
//! [`ConnectionFactory`] that opens [`RawConnection`]s; the pool, the
//! statement engine and the migration engine only ever talk to those two
//! traits.
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use quarry_query::connection::{ConnectionFactory, RawConnection};
//! use quarry_query::{QueryResult, ResultSet};
//!
//! struct MyConnection { /* socket, session state... */ }
//!
//! #[async_trait]
//! impl RawConnection for MyConnection {
//!     async fn execute(&mut self, sql: &str) -> QueryResult<u64> { todo!() }
//!     async fn fetch_all(&mut self, sql: &str) -> QueryResult<ResultSet> { todo!() }
//! }
//! ```

mod options;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use options::PoolOptions;

use async_trait::async_trait;

use crate::error::QueryResult;
use crate::row::ResultSet;

/// One live database session supplied by a driver.
///
/// A connection is only ever used by one caller at a time; the pool
/// guarantees exclusive access.
#[async_trait]
pub trait RawConnection: Send + 'static {
    /// Execute rendered SQL and return the number of affected rows.
    async fn execute(&mut self, sql: &str) -> QueryResult<u64>;

    /// Execute rendered SQL and collect every returned row.
    async fn fetch_all(&mut self, sql: &str) -> QueryResult<ResultSet>;

    /// Start a transaction on this session.
    async fn begin(&mut self) -> QueryResult<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    /// Commit the open transaction.
    async fn commit(&mut self) -> QueryResult<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> QueryResult<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    /// Lightweight liveness check used when a connection is released.
    async fn ping(&mut self) -> bool {
        true
    }

    /// Close the session. The connection is dropped afterwards.
    async fn close(&mut self) -> QueryResult<()> {
        Ok(())
    }
}

/// Opens new raw connections for a pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type this factory produces.
    type Connection: RawConnection;

    /// Open a new session.
    async fn connect(&self) -> QueryResult<Self::Connection>;
}
