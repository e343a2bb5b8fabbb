//! Per-pipeline statistics reported by the broker.

use serde::{Deserialize, Serialize};

/// Counters for one broker pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStat {
    /// Pipeline name.
    pub name: String,
    /// Broker-specific detail such as the backing queue.
    #[serde(default)]
    pub details: String,
    /// Jobs pushed since the broker started.
    #[serde(default)]
    pub total: u64,
    /// Jobs waiting to run.
    #[serde(default)]
    pub pending: u64,
    /// Jobs waiting for their delay to elapse.
    #[serde(default)]
    pub delayed: u64,
    /// Jobs that failed permanently.
    #[serde(default)]
    pub failed: u64,
}

impl PipelineStat {
    /// Jobs that are neither pending nor failed.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.total
            .saturating_sub(self.pending)
            .saturating_sub(self.failed)
    }

    /// Display label, `name:details` when details are present.
    #[must_use]
    pub fn label(&self) -> String {
        if self.details.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.details)
        }
    }
}
