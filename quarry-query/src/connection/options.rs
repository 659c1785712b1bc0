//! Pool options.

use std::time::Duration;

use tracing::info;

use crate::error::{QueryError, QueryResult};

/// Pool options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum number of open connections.
    pub max_connections: u32,
    /// Connections opened eagerly when the pool is created.
    pub min_connections: Option<u32>,
    /// Maximum time to wait for a connection.
    pub acquire_timeout: Option<Duration>,
    /// Maximum idle time before a connection is retired.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a connection.
    pub max_lifetime: Option<Duration>,
    /// Ping connections when they are released.
    pub test_on_release: bool,
    /// How long `close()` waits for leased connections to come back.
    pub close_grace_period: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            test_on_release: true,
            close_grace_period: Duration::from_secs(30),
        }
    }
}

impl PoolOptions {
    /// Create new pool options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set min connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = Some(n);
        self
    }

    /// Set acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Wait for a connection without a deadline.
    pub fn no_acquire_timeout(mut self) -> Self {
        self.acquire_timeout = None;
        self
    }

    /// Set idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Disable idle timeout.
    pub fn no_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Set max lifetime.
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Disable max lifetime.
    pub fn no_max_lifetime(mut self) -> Self {
        self.max_lifetime = None;
        self
    }

    /// Enable/disable the liveness check on release.
    pub fn test_on_release(mut self, enabled: bool) -> Self {
        self.test_on_release = enabled;
        self
    }

    /// Set the close grace period.
    pub fn close_grace_period(mut self, period: Duration) -> Self {
        self.close_grace_period = period;
        self
    }

    /// Check the options before a pool is built from them.
    pub fn validate(&self) -> QueryResult<()> {
        if self.max_connections == 0 {
            return Err(QueryError::config("max_connections must be greater than 0"));
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err(QueryError::config("min_connections must be greater than 0"));
            }
            if self.max_connections < min {
                return Err(QueryError::config(format!(
                    "max_connections ({}) must be at least min_connections ({})",
                    self.max_connections, min
                )));
            }
        }

        let durations = [
            ("acquire_timeout", self.acquire_timeout),
            ("idle_timeout", self.idle_timeout),
            ("max_lifetime", self.max_lifetime),
            ("close_grace_period", Some(self.close_grace_period)),
        ];
        for (name, value) in durations {
            if value.is_some_and(|d| d.is_zero()) {
                return Err(QueryError::config(format!("{} must be greater than 0", name)));
            }
        }

        if let (Some(idle), Some(lifetime)) = (self.idle_timeout, self.max_lifetime) {
            if idle > lifetime {
                return Err(QueryError::config(format!(
                    "idle_timeout ({:?}) must not exceed max_lifetime ({:?})",
                    idle, lifetime
                )));
            }
        }

        Ok(())
    }

    /// Options for latency-sensitive services: fail fast, keep a warm floor.
    pub fn low_latency() -> Self {
        info!(
            max_connections = 20,
            min_connections = 5,
            "PoolOptions::low_latency() initialized"
        );
        Self::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60))
    }

    /// Small pool for development and tests.
    pub fn development() -> Self {
        info!(
            max_connections = 5,
            min_connections = 1,
            "PoolOptions::development() initialized"
        );
        Self::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .test_on_release(false)
    }
}
