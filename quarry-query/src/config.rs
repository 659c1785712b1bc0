//! Configuration file parsing for `quarry.toml`.
//!
//! ```toml
//! [database]
//! dialect = "postgres"
//!
//! [pool]
//! max_connections = 20
//! acquire_timeout = "5s"
//! idle_timeout = "off"
//!
//! [migrations]
//! directory = "${APP_ROOT}/migrations"
//! strict_sequence = false
//! ```
//!
//! Values may reference environment variables as `${NAME}`; unset variables
//! are left untouched. Durations accept `ms`, `s`, `m` and `h` suffixes
//! (a bare number means seconds) or `off` to disable an optional timeout.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::PoolOptions;
use crate::error::{QueryError, QueryResult};
use crate::sql::DatabaseType;

/// Top-level `quarry.toml` structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuarryConfig {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseSection,

    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolSection,

    /// Migration settings.
    #[serde(default)]
    pub migrations: MigrationsSection,
}

/// `[database]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    /// SQL dialect used for rendering.
    #[serde(default)]
    pub dialect: DatabaseType,

    /// Connection URL, handed to the driver untouched.
    pub url: Option<String>,
}

/// `[pool]` table. Absent keys keep the [`PoolOptions`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSection {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout: Option<String>,
    pub idle_timeout: Option<String>,
    pub max_lifetime: Option<String>,
    pub test_on_release: Option<bool>,
    pub close_grace_period: Option<String>,
}

/// `[migrations]` table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsSection {
    /// Directory holding `<version>_<name>.sql` files.
    #[serde(default = "default_migrations_dir")]
    pub directory: String,

    /// History table name.
    #[serde(default = "default_history_table")]
    pub table: String,

    /// Reject gaps between consecutive versions.
    #[serde(default = "default_true")]
    pub strict_sequence: bool,
}

impl Default for MigrationsSection {
    fn default() -> Self {
        Self {
            directory: default_migrations_dir(),
            table: default_history_table(),
            strict_sequence: true,
        }
    }
}

fn default_migrations_dir() -> String {
    "./migrations".to_string()
}

fn default_history_table() -> String {
    "_quarry_migrations".to_string()
}

fn default_true() -> bool {
    true
}

impl QuarryConfig {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::config(format!("cannot read {}", path.display())).with_source(e)
        })?;
        debug!(path = %path.display(), "Loading configuration file");
        Self::from_str(&content)
    }

    /// Parse configuration from TOML text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> QueryResult<Self> {
        let expanded = expand_env_vars(content, |name| env::var(name).ok())?;
        let config: Self = toml::from_str(&expanded)
            .map_err(|e| QueryError::config(e.message().to_string()).with_source(e))?;
        config.pool_options()?;
        Ok(config)
    }

    /// Validated pool options built from the `[pool]` table.
    pub fn pool_options(&self) -> QueryResult<PoolOptions> {
        let options = self.pool.to_options()?;
        options.validate()?;
        Ok(options)
    }
}

impl PoolSection {
    /// Apply this table over the default options, without validating.
    pub fn to_options(&self) -> QueryResult<PoolOptions> {
        let mut options = PoolOptions::new();
        if let Some(max) = self.max_connections {
            options = options.max_connections(max);
        }
        if let Some(min) = self.min_connections {
            options = options.min_connections(min);
        }
        if let Some(text) = &self.acquire_timeout {
            options.acquire_timeout = parse_optional_duration("acquire_timeout", text)?;
        }
        if let Some(text) = &self.idle_timeout {
            options.idle_timeout = parse_optional_duration("idle_timeout", text)?;
        }
        if let Some(text) = &self.max_lifetime {
            options.max_lifetime = parse_optional_duration("max_lifetime", text)?;
        }
        if let Some(enabled) = self.test_on_release {
            options = options.test_on_release(enabled);
        }
        if let Some(text) = &self.close_grace_period {
            options = options.close_grace_period(parse_duration("close_grace_period", text)?);
        }
        Ok(options)
    }
}

/// Parse `"500ms"`, `"30s"`, `"10m"`, `"1h"` or a bare number of seconds.
pub fn parse_duration(key: &str, text: &str) -> QueryResult<Duration> {
    let text = text.trim();
    let invalid = || {
        QueryError::config(format!("'{}' is not a valid duration for {}", text, key))
            .with_parameter(key)
            .with_suggestion("Use a number followed by ms, s, m or h, e.g. \"30s\"")
    };

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    let seconds_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(amount)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

fn parse_optional_duration(key: &str, text: &str) -> QueryResult<Option<Duration>> {
    match text.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "disabled" => Ok(None),
        _ => parse_duration(key, text).map(Some),
    }
}

/// Expand `${NAME}` references using `lookup`; unknown names stay as written.
fn expand_env_vars(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> QueryResult<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| QueryError::internal(format!("environment pattern: {}", e)))?;
    let expanded = re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}
