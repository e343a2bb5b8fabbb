//! Structured telemetry initialisation for hosts embedding the client.
//!
//! The client itself only emits `tracing` events. Installing a subscriber is
//! left to the host; this module offers one configured from [`Config`].

use std::io::{self, IsTerminal};

use courier_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching the global
/// state again.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when `log_filter` does not parse and
/// [`TelemetryError::Subscriber`] when another subscriber is already
/// installed.
///
/// # Examples
///
/// ```rust
/// use courier_client::telemetry;
/// use courier_config::Config;
///
/// # fn main() -> Result<(), courier_client::telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// drop(first);
/// drop(second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

/// Builds the subscriber [`initialise`] would install, without installing it.
///
/// Useful with [`tracing::subscriber::with_default`] when a host wants the
/// client's events routed through a scoped subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when `log_filter` does not parse.
pub fn subscriber(config: &Config) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    })
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    tracing::subscriber::set_global_default(subscriber(config)?)
        .map_err(TelemetryError::Subscriber)
}
