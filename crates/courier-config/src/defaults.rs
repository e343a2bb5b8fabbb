//! Built-in defaults shared by the configuration layers.

use crate::logging::LogFormat;

/// Default log filter expression used by embedding hosts.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default number of transport attempts per dispatch, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default upper bound for a single backoff delay, in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Default deadline for a dispatch call, in milliseconds.
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 30_000;

/// Default maximum number of simultaneously open broker channels.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
