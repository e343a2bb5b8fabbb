//! Errors surfaced by dispatch calls.

use std::time::Duration;

use thiserror::Error;

use crate::codec::SerializationError;
use crate::protocol::{RejectReason, RequestId};
use crate::transport::TransportError;

/// Why a dispatch call did not produce a job id.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload could not be encoded; nothing was sent.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The broker refused the request. Never retried automatically, except
    /// for saturation when the client is configured to retry it.
    #[error("broker rejected request {request_id}: {reason}: {message}")]
    Rejected {
        /// Request that was refused.
        request_id: RequestId,
        /// Machine-readable reason.
        reason: RejectReason,
        /// Broker-supplied detail.
        message: String,
    },

    /// No acknowledgement arrived before the deadline.
    ///
    /// The broker may or may not have enqueued the job. Resubmitting the same
    /// envelope reuses its request id, so a broker that de-duplicates will
    /// not run it twice.
    #[error(
        "no acknowledgement for request {request_id} within {}ms; the job may or may not have been enqueued",
        after.as_millis()
    )]
    Timeout {
        /// Request that timed out.
        request_id: RequestId,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The transport kept failing until the attempt budget ran out.
    #[error("transport failed after {attempts} attempt(s) for request {request_id}: {source}")]
    Transport {
        /// Request being sent.
        request_id: RequestId,
        /// Attempts made, the first one included.
        attempts: u32,
        /// Failure of the last attempt.
        #[source]
        source: TransportError,
    },
}

impl DispatchError {
    /// Request the error belongs to, when one was assigned.
    #[must_use]
    pub const fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Serialization(_) => None,
            Self::Rejected { request_id, .. }
            | Self::Timeout { request_id, .. }
            | Self::Transport { request_id, .. } => Some(request_id),
        }
    }

    /// Whether the broker may have enqueued the job despite the error.
    #[must_use]
    pub const fn outcome_unknown(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
