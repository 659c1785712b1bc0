//! Transactions scoped to one pooled connection.
//!
//! A [`Transaction`] borrows its [`PooledConnection`] mutably, so nothing
//! else can run on that connection until the transaction is committed,
//! rolled back or dropped. Dropping an unfinished transaction leaves the
//! server-side transaction open; the connection is then discarded instead of
//! being returned to the idle set.
//!
//! ```rust,ignore
//! let mut conn = pool.acquire().await?;
//! let mut tx = conn.begin().await?;
//! tx.execute("insert into t values (1)").await?;
//! tx.savepoint("before_second").await?;
//! if tx.execute("insert into t values (2)").await.is_err() {
//!     tx.rollback_to("before_second").await?;
//! }
//! tx.commit().await?;
//! conn.close().await?;
//! ```

use tracing::{debug, warn};

use crate::connection::{ConnectionFactory, RawConnection};
use crate::error::{QueryError, QueryResult};
use crate::pool::PooledConnection;
use crate::row::ResultSet;
use crate::sql::is_plain_identifier;

impl<F: ConnectionFactory> PooledConnection<F> {
    /// Start a transaction on this connection.
    pub async fn begin(&mut self) -> QueryResult<Transaction<'_, F>> {
        self.raw_mut()?.begin().await?;
        self.set_dirty(true);
        debug!(connection = self.id(), "Transaction started");
        Ok(Transaction {
            conn: self,
            finished: false,
        })
    }
}

/// An open transaction.
pub struct Transaction<'c, F: ConnectionFactory> {
    conn: &'c mut PooledConnection<F>,
    finished: bool,
}

impl<F: ConnectionFactory> Transaction<'_, F> {
    fn raw(&mut self) -> QueryResult<&mut F::Connection> {
        if self.finished {
            return Err(QueryError::transaction_closed());
        }
        self.conn.raw_mut()
    }

    /// Execute rendered SQL inside the transaction.
    pub async fn execute(&mut self, sql: &str) -> QueryResult<u64> {
        self.raw()?.execute(sql).await
    }

    /// Execute rendered SQL inside the transaction and collect rows.
    pub async fn fetch_all(&mut self, sql: &str) -> QueryResult<ResultSet> {
        self.raw()?.fetch_all(sql).await
    }

    /// Create a savepoint.
    pub async fn savepoint(&mut self, name: &str) -> QueryResult<()> {
        let sql = format!("SAVEPOINT {}", savepoint_name(name)?);
        self.execute(&sql).await.map(|_| ())
    }

    /// Roll back to a savepoint, keeping the transaction open.
    pub async fn rollback_to(&mut self, name: &str) -> QueryResult<()> {
        let sql = format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(name)?);
        self.execute(&sql).await.map(|_| ())
    }

    /// Release a savepoint.
    pub async fn release_savepoint(&mut self, name: &str) -> QueryResult<()> {
        let sql = format!("RELEASE SAVEPOINT {}", savepoint_name(name)?);
        self.execute(&sql).await.map(|_| ())
    }

    /// Commit the transaction.
    ///
    /// If the commit fails the connection is discarded on release.
    pub async fn commit(mut self) -> QueryResult<()> {
        self.raw()?.commit().await?;
        self.finished = true;
        self.conn.set_dirty(false);
        debug!(connection = self.conn.id(), "Transaction committed");
        Ok(())
    }

    /// Roll the transaction back.
    pub async fn rollback(mut self) -> QueryResult<()> {
        self.raw()?.rollback().await?;
        self.finished = true;
        self.conn.set_dirty(false);
        debug!(connection = self.conn.id(), "Transaction rolled back");
        Ok(())
    }
}

impl<F: ConnectionFactory> Drop for Transaction<'_, F> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                connection = self.conn.id(),
                "Transaction dropped without commit or rollback; connection will be discarded"
            );
        }
    }
}

fn savepoint_name(name: &str) -> QueryResult<&str> {
    if is_plain_identifier(name) {
        Ok(name)
    } else {
        Err(QueryError::invalid_value(format!("invalid savepoint name '{}'", name))
            .with_parameter(name))
    }
}
