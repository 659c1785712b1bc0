//! Client facade tying a pool, an encoder registry and a dialect together.

use std::sync::Arc;

use tracing::{debug, info};

use crate::connection::{ConnectionFactory, PoolOptions, RawConnection};
use crate::encoder::ValueEncoderRegistry;
use crate::error::QueryResult;
use crate::notify::{ChannelRegistry, Subscription};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::row::{FromRow, ResultSet};
use crate::sql::DatabaseType;
use crate::statement::Statement;

/// A database client.
///
/// Cloning is cheap; clones share the pool and the listener registry.
pub struct Database<F: ConnectionFactory> {
    pool: ConnectionPool<F>,
    encoders: Arc<ValueEncoderRegistry>,
    dialect: DatabaseType,
    listeners: ChannelRegistry,
}

impl<F: ConnectionFactory> Clone for Database<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            encoders: Arc::clone(&self.encoders),
            dialect: self.dialect,
            listeners: self.listeners.clone(),
        }
    }
}

impl<F: ConnectionFactory> Database<F> {
    /// Connect with an empty encoder registry.
    pub async fn connect(
        factory: F,
        dialect: DatabaseType,
        options: PoolOptions,
    ) -> QueryResult<Self> {
        Self::connect_with(factory, dialect, options, ValueEncoderRegistry::new()).await
    }

    /// Connect with custom value encoders.
    pub async fn connect_with(
        factory: F,
        dialect: DatabaseType,
        options: PoolOptions,
        encoders: ValueEncoderRegistry,
    ) -> QueryResult<Self> {
        let pool = ConnectionPool::connect(factory, options).await?;
        info!(dialect = dialect.name(), "Database client ready");
        Ok(Self {
            pool,
            encoders: Arc::new(encoders),
            dialect,
            listeners: ChannelRegistry::new(),
        })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.pool
    }

    /// The encoder registry used for rendering.
    pub fn encoders(&self) -> &ValueEncoderRegistry {
        &self.encoders
    }

    /// The SQL dialect.
    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    /// The notification registry drivers dispatch into.
    pub fn notifications(&self) -> &ChannelRegistry {
        &self.listeners
    }

    /// Listen for notifications on `channels`.
    pub fn listen<I, S>(&self, channels: I) -> QueryResult<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listeners.subscribe(channels)
    }

    /// Render a statement for this client's dialect.
    pub fn render(&self, statement: &Statement) -> QueryResult<String> {
        statement.render_dialect(self.dialect, &self.encoders)
    }

    /// Lease a connection.
    pub async fn acquire(&self) -> QueryResult<PooledConnection<F>> {
        self.pool.acquire().await
    }

    /// Render and execute a statement on a pooled connection.
    pub async fn execute(&self, statement: &Statement) -> QueryResult<u64> {
        let sql = self.render(statement)?;
        let mut conn = self.pool.acquire().await?;
        let result = conn.execute(&sql).await;
        conn.close().await?;
        debug!(rows = ?result.as_ref().ok(), "Statement executed");
        result
    }

    /// Render a statement and fetch every row.
    pub async fn fetch_all(&self, statement: &Statement) -> QueryResult<ResultSet> {
        let sql = self.render(statement)?;
        let mut conn = self.pool.acquire().await?;
        let result = conn.fetch_all(&sql).await;
        conn.close().await?;
        result
    }

    /// Lease a connection and start a transaction on it.
    ///
    /// The connection goes back to the pool on commit or rollback. Dropping
    /// the transaction unfinished discards the connection.
    pub async fn begin(&self) -> QueryResult<DatabaseTransaction<F>> {
        let mut conn = self.pool.acquire().await?;
        if let Err(e) = conn.raw_mut()?.begin().await {
            let _ = conn.close().await;
            return Err(e);
        }
        conn.set_dirty(true);
        debug!(connection = conn.id(), "Pooled transaction started");
        Ok(DatabaseTransaction {
            conn,
            encoders: Arc::clone(&self.encoders),
            dialect: self.dialect,
        })
    }

    /// Render a statement, fetch every row and decode into `T`.
    pub async fn fetch_as<T: FromRow>(&self, statement: &Statement) -> QueryResult<Vec<T>> {
        self.fetch_all(statement).await?.decode()
    }

    /// Open connections.
    pub fn pool_size(&self) -> usize {
        self.pool.pool_size()
    }

    /// Idle connections.
    pub fn pool_idle_size(&self) -> usize {
        self.pool.pool_idle_size()
    }

    /// Close listeners, then the pool.
    pub async fn close(&self) {
        self.listeners.close();
        self.pool.close().await;
    }
}

/// A transaction that owns its pooled connection.
///
/// Created by [`Database::begin`].
pub struct DatabaseTransaction<F: ConnectionFactory> {
    conn: PooledConnection<F>,
    encoders: Arc<ValueEncoderRegistry>,
    dialect: DatabaseType,
}

impl<F: ConnectionFactory> DatabaseTransaction<F> {
    /// Pool-assigned id of the leased connection.
    pub fn connection_id(&self) -> u64 {
        self.conn.id()
    }

    /// Render and execute a statement inside the transaction.
    pub async fn execute(&mut self, statement: &Statement) -> QueryResult<u64> {
        let sql = statement.render_dialect(self.dialect, &self.encoders)?;
        self.conn.execute(&sql).await
    }

    /// Render a statement and fetch every row inside the transaction.
    pub async fn fetch_all(&mut self, statement: &Statement) -> QueryResult<ResultSet> {
        let sql = statement.render_dialect(self.dialect, &self.encoders)?;
        self.conn.fetch_all(&sql).await
    }

    /// Commit and return the connection to the pool.
    ///
    /// A failed commit discards the connection.
    pub async fn commit(mut self) -> QueryResult<()> {
        let committed = self.conn.raw_mut()?.commit().await;
        if committed.is_ok() {
            self.conn.set_dirty(false);
            debug!(connection = self.conn.id(), "Pooled transaction committed");
        }
        let released = self.conn.close().await;
        committed?;
        released
    }

    /// Roll back and return the connection to the pool.
    ///
    /// A failed rollback discards the connection.
    pub async fn rollback(mut self) -> QueryResult<()> {
        let rolled_back = self.conn.raw_mut()?.rollback().await;
        if rolled_back.is_ok() {
            self.conn.set_dirty(false);
            debug!(connection = self.conn.id(), "Pooled transaction rolled back");
        }
        let released = self.conn.close().await;
        rolled_back?;
        released
    }
}
