//! Per-job dispatch options.
//!
//! [`JobOptions`] is an immutable value: every `with_*` method returns a new
//! instance and leaves the receiver untouched, so one options value can be
//! shared freely between concurrent dispatch calls.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Routing and scheduling intent attached to a job.
///
/// On the wire both keys are always present, `null` when unset:
///
/// ```
/// use courier_client::JobOptions;
///
/// let wire = JobOptions::delayed(30).to_wire_format();
/// assert_eq!(wire.to_string(), r#"{"delay":30,"pipeline":null}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(deserialize_with = "required")]
    delay: Option<u64>,
    #[serde(deserialize_with = "required")]
    pipeline: Option<String>,
}

impl JobOptions {
    /// Options for immediate dispatch to the default pipeline.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delay: None,
            pipeline: None,
        }
    }

    /// Options delaying eligibility by `delay` seconds.
    #[must_use]
    pub const fn delayed(delay: u64) -> Self {
        Self {
            delay: Some(delay),
            pipeline: None,
        }
    }

    /// Returns a copy with the delay replaced.
    ///
    /// The broker is responsible for rejecting delays it cannot honour.
    #[must_use]
    pub fn with_delay(&self, delay: Option<u64>) -> Self {
        Self {
            delay,
            pipeline: self.pipeline.clone(),
        }
    }

    /// Returns a copy routed to `pipeline`; `None` selects the broker default.
    #[must_use]
    pub fn with_pipeline(&self, pipeline: Option<&str>) -> Self {
        Self {
            delay: self.delay,
            pipeline: pipeline.map(str::to_owned),
        }
    }

    /// Delay in seconds, if any.
    #[must_use]
    pub const fn delay(&self) -> Option<u64> {
        self.delay
    }

    /// Delay as a [`Duration`], if any.
    #[must_use]
    pub fn delay_duration(&self) -> Option<Duration> {
        self.delay.map(Duration::from_secs)
    }

    /// Target pipeline, if any.
    #[must_use]
    pub fn pipeline(&self) -> Option<&str> {
        self.pipeline.as_deref()
    }

    /// Wire representation with both keys present.
    #[must_use]
    pub fn to_wire_format(&self) -> Value {
        serde_json::json!({
            "delay": self.delay,
            "pipeline": self.pipeline,
        })
    }
}

/// Deserializes an `Option` whose key must be present, even when `null`.
fn required<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}
