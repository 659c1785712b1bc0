//! Bounded connection pool.
//!
//! The pool hands out exclusive [`PooledConnection`]s. A semaphore with
//! `max_connections` permits bounds how many callers hold or are opening a
//! connection; the idle set and the in-use count live behind one mutex that
//! is never held across an `.await`.
//!
//! ```rust,ignore
//! use quarry_query::{ConnectionPool, PoolOptions};
//!
//! let pool = ConnectionPool::connect(driver, PoolOptions::new().max_connections(4)).await?;
//! let mut conn = pool.acquire().await?;
//! conn.execute("select 1").await?;
//! conn.close().await?; // back to the idle set
//! pool.close().await;
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnectionFactory, PoolOptions, RawConnection};
use crate::error::{QueryError, QueryResult};
use crate::row::ResultSet;

/// Lifecycle of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Accepting acquires.
    Running,
    /// Refusing acquires, waiting for leased connections.
    Closing,
    /// Every connection has been closed.
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionMeta {
    id: u64,
    created_at: Instant,
    idle_since: Instant,
}

struct IdleConnection<C> {
    raw: C,
    meta: ConnectionMeta,
}

struct PoolState<C> {
    idle: VecDeque<IdleConnection<C>>,
    in_use: usize,
    status: PoolStatus,
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    options: PoolOptions,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState<F::Connection>>,
    released: Notify,
    next_id: AtomicU64,
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn is_expired(&self, meta: &ConnectionMeta, now: Instant) -> bool {
        self.lifetime_exceeded(meta, now)
            || self
                .options
                .idle_timeout
                .is_some_and(|timeout| now.duration_since(meta.idle_since) >= timeout)
    }

    fn lifetime_exceeded(&self, meta: &ConnectionMeta, now: Instant) -> bool {
        self.options
            .max_lifetime
            .is_some_and(|lifetime| now.duration_since(meta.created_at) >= lifetime)
    }

    fn new_meta(&self) -> ConnectionMeta {
        let now = Instant::now();
        ConnectionMeta {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            created_at: now,
            idle_since: now,
        }
    }

    /// Return a connection handed back through `PooledConnection::close`.
    async fn release(&self, mut raw: F::Connection, meta: ConnectionMeta, dirty: bool) {
        // The connection leaves the in-use count before the liveness check so
        // a cancelled release cannot leak it.
        {
            let mut state = self.state.lock();
            state.in_use -= 1;
        }

        let now = Instant::now();
        let reason = if dirty {
            Some("left inside an unfinished transaction")
        } else if self.lifetime_exceeded(&meta, now) {
            Some("exceeded max lifetime")
        } else if self.options.test_on_release && !raw.ping().await {
            Some("failed liveness check")
        } else {
            None
        };

        let discard = {
            let mut state = self.state.lock();
            match (reason, state.status) {
                (None, PoolStatus::Running) => {
                    state.idle.push_back(IdleConnection {
                        raw,
                        meta: ConnectionMeta {
                            idle_since: Instant::now(),
                            ..meta
                        },
                    });
                    None
                }
                (reason, _) => Some((raw, reason.unwrap_or("pool is closing"))),
            }
        };
        self.released.notify_waiters();

        match discard {
            Some((mut raw, reason)) => {
                debug!(connection = meta.id, reason, "Discarding released connection");
                close_quietly(&mut raw, meta.id).await;
            }
            None => trace!(connection = meta.id, "Connection returned to idle set"),
        }
    }

    /// Synchronous fallback for handles dropped without `close`.
    fn release_on_drop(&self, raw: F::Connection, meta: ConnectionMeta, dirty: bool) {
        let now = Instant::now();
        let keep = !dirty && !self.lifetime_exceeded(&meta, now);
        let discarded = {
            let mut state = self.state.lock();
            state.in_use -= 1;
            if keep && state.status == PoolStatus::Running {
                state.idle.push_back(IdleConnection {
                    raw,
                    meta: ConnectionMeta {
                        idle_since: now,
                        ..meta
                    },
                });
                None
            } else {
                Some(raw)
            }
        };
        self.released.notify_waiters();

        if discarded.is_some() {
            if dirty {
                warn!(
                    connection = meta.id,
                    "Connection dropped inside an unfinished transaction; discarding it"
                );
            } else {
                debug!(connection = meta.id, "Dropped connection discarded without close");
            }
        }
    }
}

async fn retire<C: RawConnection>(expired: Vec<IdleConnection<C>>) {
    for mut stale in expired {
        debug!(connection = stale.meta.id, "Retiring expired idle connection");
        close_quietly(&mut stale.raw, stale.meta.id).await;
    }
}

async fn close_quietly<C: RawConnection>(raw: &mut C, id: u64) {
    if let Err(e) = raw.close().await {
        warn!(connection = id, error = %e, "Error while closing connection");
    }
}

/// A bounded pool of raw connections.
pub struct ConnectionPool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.pool_size())
            .field("idle", &self.pool_idle_size())
            .field("status", &self.status())
            .finish()
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Build a pool without opening any connection.
    pub fn new(factory: F, options: PoolOptions) -> QueryResult<Self> {
        options.validate()?;
        info!(
            max_connections = options.max_connections,
            min_connections = options.min_connections.unwrap_or(0),
            "Connection pool created"
        );

        let max = options.max_connections as usize;
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                semaphore: Arc::new(Semaphore::new(max)),
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(max),
                    in_use: 0,
                    status: PoolStatus::Running,
                }),
                released: Notify::new(),
                next_id: AtomicU64::new(1),
                options,
            }),
        })
    }

    /// Build a pool and eagerly open `min_connections` connections.
    pub async fn connect(factory: F, options: PoolOptions) -> QueryResult<Self> {
        let pool = Self::new(factory, options)?;
        let min = pool.inner.options.min_connections.unwrap_or(0);
        if min > 0 {
            debug!("Pre-warming pool with {} connections", min);
        }
        for _ in 0..min {
            match pool.inner.factory.connect().await {
                Ok(raw) => {
                    let meta = pool.inner.new_meta();
                    pool.inner.state.lock().idle.push_back(IdleConnection { raw, meta });
                }
                Err(e) => {
                    pool.close().await;
                    return Err(e);
                }
            }
        }
        Ok(pool)
    }

    /// The options this pool was built with.
    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Current lifecycle state.
    pub fn status(&self) -> PoolStatus {
        self.inner.state.lock().status
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.status() != PoolStatus::Running
    }

    /// Open connections, idle plus leased.
    pub fn pool_size(&self) -> usize {
        let state = self.inner.state.lock();
        state.idle.len() + state.in_use
    }

    /// Idle connections.
    pub fn pool_idle_size(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Leased connections.
    pub fn pool_in_use(&self) -> usize {
        self.inner.state.lock().in_use
    }

    /// Lease a connection, waiting up to `acquire_timeout` for one.
    pub async fn acquire(&self) -> QueryResult<PooledConnection<F>> {
        match self.inner.options.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.acquire_inner())
                .await
                .map_err(|_| {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Acquire timed out");
                    QueryError::pool_timed_out(timeout)
                })?,
            None => self.acquire_inner().await,
        }
    }

    async fn acquire_inner(&self) -> QueryResult<PooledConnection<F>> {
        if self.is_closed() {
            return Err(QueryError::pool_closed());
        }
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| QueryError::pool_closed())?;

        let (reused, expired) = self.take_idle()?;
        match reused {
            Some(conn) => {
                // Build the handle before awaiting so a cancelled acquire
                // hands the connection back through `Drop`.
                trace!(connection = conn.meta.id, "Reusing idle connection");
                let handle =
                    PooledConnection::new(Arc::clone(&self.inner), conn.raw, conn.meta, permit);
                retire(expired).await;
                return Ok(handle);
            }
            None => retire(expired).await,
        }

        let mut raw = self.inner.factory.connect().await?;
        let meta = self.inner.new_meta();
        {
            let mut state = self.inner.state.lock();
            if state.status == PoolStatus::Running {
                state.in_use += 1;
                drop(state);
                debug!(connection = meta.id, "Opened new connection");
                return Ok(PooledConnection::new(
                    Arc::clone(&self.inner),
                    raw,
                    meta,
                    permit,
                ));
            }
        }
        close_quietly(&mut raw, meta.id).await;
        Err(QueryError::pool_closed())
    }

    /// Pop the first usable idle connection, collecting expired ones.
    #[allow(clippy::type_complexity)]
    fn take_idle(
        &self,
    ) -> QueryResult<(
        Option<IdleConnection<F::Connection>>,
        Vec<IdleConnection<F::Connection>>,
    )> {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut state = self.inner.state.lock();
        if state.status != PoolStatus::Running {
            return Err(QueryError::pool_closed());
        }
        while let Some(candidate) = state.idle.pop_back() {
            if self.inner.is_expired(&candidate.meta, now) {
                expired.push(candidate);
                continue;
            }
            state.in_use += 1;
            return Ok((Some(candidate), expired));
        }
        Ok((None, expired))
    }

    /// Close the pool.
    ///
    /// New acquires fail with `PoolClosed` immediately. Leased connections
    /// get up to `close_grace_period` to come back; any returned later is
    /// closed on release. Idle connections are then closed.
    ///
    /// Calls made while another close is in progress wait for it to finish.
    pub async fn close(&self) {
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = state.status;
            if previous == PoolStatus::Running {
                state.status = PoolStatus::Closing;
            }
            previous
        };
        match previous {
            PoolStatus::Running => {}
            PoolStatus::Closing => return self.wait_closed().await,
            PoolStatus::Closed => return,
        }
        self.inner.semaphore.close();
        info!("Closing connection pool");

        let drained = async {
            loop {
                let released = self.inner.released.notified();
                if self.inner.state.lock().in_use == 0 {
                    break;
                }
                released.await;
            }
        };
        let grace = self.inner.options.close_grace_period;
        if tokio::time::timeout(grace, drained).await.is_err() {
            warn!(
                in_use = self.pool_in_use(),
                grace_ms = grace.as_millis() as u64,
                "Close grace period elapsed with connections still leased"
            );
        }

        let idle: Vec<_> = self.inner.state.lock().idle.drain(..).collect();
        for mut conn in idle {
            close_quietly(&mut conn.raw, conn.meta.id).await;
        }

        self.inner.state.lock().status = PoolStatus::Closed;
        self.inner.released.notify_waiters();
        info!("Connection pool closed");
    }

    async fn wait_closed(&self) {
        loop {
            let changed = self.inner.released.notified();
            if self.status() == PoolStatus::Closed {
                break;
            }
            changed.await;
        }
    }
}

/// An exclusive lease on one pooled connection.
///
/// Call [`close`](Self::close) to return it. Dropping the handle returns it
/// too, but without the liveness check.
pub struct PooledConnection<F: ConnectionFactory> {
    pool: Arc<PoolInner<F>>,
    raw: Option<F::Connection>,
    meta: ConnectionMeta,
    permit: Option<OwnedSemaphorePermit>,
    dirty: bool,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn new(
        pool: Arc<PoolInner<F>>,
        raw: F::Connection,
        meta: ConnectionMeta,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            raw: Some(raw),
            meta,
            permit: Some(permit),
            dirty: false,
        }
    }

    /// Pool-assigned connection id.
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Time since the underlying connection was opened.
    pub fn age(&self) -> Duration {
        self.meta.created_at.elapsed()
    }

    /// Whether this handle has been released.
    pub fn is_closed(&self) -> bool {
        self.raw.is_none()
    }

    /// Borrow the driver connection.
    pub fn raw_mut(&mut self) -> QueryResult<&mut F::Connection> {
        self.raw.as_mut().ok_or_else(QueryError::connection_closed)
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Execute rendered SQL.
    pub async fn execute(&mut self, sql: &str) -> QueryResult<u64> {
        self.raw_mut()?.execute(sql).await
    }

    /// Execute rendered SQL and collect rows.
    pub async fn fetch_all(&mut self, sql: &str) -> QueryResult<ResultSet> {
        self.raw_mut()?.fetch_all(sql).await
    }

    /// Return the connection to the pool.
    ///
    /// Fails with `ConnectionClosed` if the handle was already released.
    pub async fn close(&mut self) -> QueryResult<()> {
        let raw = self.raw.take().ok_or_else(QueryError::connection_closed)?;
        self.pool.release(raw, self.meta, self.dirty).await;
        self.permit.take();
        Ok(())
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.pool.release_on_drop(raw, self.meta, self.dirty);
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.meta.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
