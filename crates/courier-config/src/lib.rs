//! Shared configuration for the courier job-dispatch client.
//!
//! [`Config`] layers built-in defaults, an optional configuration file,
//! `COURIER_*` environment variables and command-line flags through
//! `ortho_config`. Embedding hosts load it once and hand it to the dispatch
//! client; nothing in the client reads process-wide configuration on its own.

mod defaults;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_DISPATCH_TIMEOUT_MS, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_POOL_SIZE, default_log_filter,
    default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Error returned when the configuration layers cannot be merged.
pub type ConfigError = Arc<OrthoError>;

/// Runtime configuration for the dispatch client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "COURIER")]
pub struct Config {
    /// Tracing filter expression applied by the telemetry subscriber.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format of the telemetry subscriber.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Total transport attempts per dispatch, the first one included.
    #[ortho_config(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[ortho_config(default = DEFAULT_INITIAL_BACKOFF_MS)]
    pub initial_backoff_ms: u64,
    /// Upper bound for a single backoff delay, in milliseconds.
    #[ortho_config(default = DEFAULT_MAX_BACKOFF_MS)]
    pub max_backoff_ms: u64,
    /// Deadline applied to dispatch calls that do not pass their own.
    #[ortho_config(default = DEFAULT_DISPATCH_TIMEOUT_MS)]
    pub dispatch_timeout_ms: u64,
    /// Maximum number of simultaneously open broker channels.
    #[ortho_config(default = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,
    /// Retry "queue full" rejections with backoff instead of surfacing them.
    #[ortho_config(default = false)]
    pub retry_saturated: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
            pool_size: DEFAULT_POOL_SIZE,
            retry_saturated: false,
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Total attempts per dispatch; never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Cap applied to every backoff delay.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Default per-call dispatch deadline.
    #[must_use]
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Maximum number of open channels; never less than one.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size.max(1)
    }

    /// Whether saturation rejections are retried.
    #[must_use]
    pub const fn retry_saturated(&self) -> bool {
        self.retry_saturated
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.max_attempts(), 5);
        assert_eq!(config.initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.max_backoff(), Duration::from_secs(5));
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(30));
        assert_eq!(config.pool_size(), 4);
        assert!(!config.retry_saturated());
    }

    #[rstest]
    fn zero_attempts_and_pool_size_are_clamped() {
        let config = Config {
            max_attempts: 0,
            pool_size: 0,
            ..Config::default()
        };
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.pool_size(), 1);
    }
}
