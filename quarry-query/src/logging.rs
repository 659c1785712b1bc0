//! Logging setup for Quarry.
//!
//! Library code logs through the `tracing` macros and never installs a
//! subscriber on its own. Applications that do not bring their own
//! subscriber can call [`init`], which reads:
//!
//! - `QUARRY_DEBUG=true|1|yes` - enable debug logging
//! - `QUARRY_LOG_LEVEL=trace|debug|info|warn|error` - explicit level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! A subscriber is only installed when the `tracing-subscriber` feature is
//! enabled.
//!
//! ```rust,no_run
//! use quarry_query::logging;
//!
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "QUARRY_DEBUG";
const LEVEL_VAR: &str = "QUARRY_LOG_LEVEL";
const FORMAT_VAR: &str = "QUARRY_LOG_FORMAT";

fn truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Whether `QUARRY_DEBUG` is set to `true`, `1` or `yes`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR).map(|v| truthy(&v)).unwrap_or(false)
}

fn resolve_level(level: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match level.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn resolve_format(format: Option<&str>) -> &'static str {
    match format.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// The configured log level; `debug` when `QUARRY_DEBUG` is on, else `warn`.
pub fn get_log_level() -> &'static str {
    resolve_level(env::var(LEVEL_VAR).ok().as_deref(), is_debug_enabled())
}

/// The configured output format.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var(FORMAT_VAR).ok().as_deref())
}

/// Install the Quarry subscriber once.
///
/// Does nothing unless `QUARRY_DEBUG` or `QUARRY_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "quarry={},quarry_query={},quarry_migrate={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level, format = get_log_format(), "Quarry logging initialized");
            }
        }
    });
}

/// Set `QUARRY_LOG_LEVEL` and call [`init`].
///
/// # Safety
///
/// Modifies the process environment. Call it at startup, before other
/// threads exist.
pub fn init_with_level(level: &str) {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var(LEVEL_VAR, level);
    }
    init();
}

/// Log at debug level only when `QUARRY_DEBUG` is on.
#[macro_export]
macro_rules! quarry_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}
