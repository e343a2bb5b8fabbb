//! Request and reply frames exchanged with the broker.
//!
//! Each frame is one line of JSON. Requests name the command and carry a
//! request identifier; replies echo that identifier so the client can tell
//! which call they answer. A push request reuses the envelope id as its
//! request id, so resubmitting the same envelope lets the broker recognise
//! the duplicate.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::envelope::{JobEnvelope, JobId};
use crate::stat::PipelineStat;
use crate::transport::TransportError;

/// Correlates a reply with the request that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identifier for requests that carry no envelope.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrows the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&JobId> for RequestId {
    fn from(id: &JobId) -> Self {
        Self(id.as_str().to_owned())
    }
}

/// Commands understood by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BrokerCommand {
    /// Enqueue a job.
    Push {
        /// Job to enqueue.
        envelope: JobEnvelope,
    },
    /// Report per-pipeline statistics.
    Stat,
}

/// A request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Identifier echoed by the reply.
    pub request_id: RequestId,
    /// Command to execute.
    #[serde(flatten)]
    pub command: BrokerCommand,
}

impl RequestFrame {
    /// Push request keyed by the envelope id.
    #[must_use]
    pub fn push(envelope: JobEnvelope) -> Self {
        Self {
            request_id: RequestId::from(envelope.id()),
            command: BrokerCommand::Push { envelope },
        }
    }

    /// Statistics request with a fresh id.
    #[must_use]
    pub fn stat() -> Self {
        Self {
            request_id: RequestId::generate(),
            command: BrokerCommand::Stat,
        }
    }

    /// Encodes the frame as a single JSON line.
    ///
    /// # Errors
    ///
    /// Fails when the envelope payload is not valid UTF-8.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Why the broker refused a request.
///
/// Reasons this client has no variant for are kept verbatim in
/// [`RejectReason::Other`] and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The target pipeline does not exist.
    PipelineNotFound,
    /// The pipeline queue is full.
    Saturated,
    /// The envelope failed broker-side validation.
    InvalidEnvelope,
    /// A reason this client does not recognise, as the broker sent it.
    Other(String),
}

impl RejectReason {
    /// Wire name of the reason.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PipelineNotFound => "pipeline_not_found",
            Self::Saturated => "saturated",
            Self::InvalidEnvelope => "invalid_envelope",
            Self::Other(reason) => reason.as_str(),
        }
    }
}

impl From<String> for RejectReason {
    fn from(reason: String) -> Self {
        match reason.as_str() {
            "pipeline_not_found" => Self::PipelineNotFound,
            "saturated" => Self::Saturated,
            "invalid_envelope" => Self::InvalidEnvelope,
            _ => Self::Other(reason),
        }
    }
}

impl Serialize for RejectReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RejectReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipelineNotFound => formatter.write_str("pipeline not found"),
            Self::Saturated => formatter.write_str("pipeline saturated"),
            Self::InvalidEnvelope => formatter.write_str("invalid envelope"),
            Self::Other(reason) => formatter.write_str(reason),
        }
    }
}

/// Body of a reply frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BrokerReply {
    /// The job was enqueued.
    Accepted {
        /// Identifier assigned by the broker.
        job_id: JobId,
    },
    /// The broker refused the request; retrying cannot help.
    Rejected {
        /// Machine-readable reason.
        reason: RejectReason,
        /// Broker-supplied detail.
        #[serde(default)]
        message: String,
    },
    /// The broker cannot serve requests right now.
    Unavailable {
        /// Broker-supplied detail.
        #[serde(default)]
        message: String,
    },
    /// Pipeline statistics.
    Stats {
        /// One entry per pipeline.
        pipelines: Vec<PipelineStat>,
    },
}

impl BrokerReply {
    /// Wire name of the reply status.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } => "unavailable",
            Self::Stats { .. } => "stats",
        }
    }
}

/// A reply frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    /// Identifier of the request being answered.
    pub request_id: RequestId,
    /// Reply body.
    #[serde(flatten)]
    pub reply: BrokerReply,
}

impl ReplyFrame {
    /// Parses a reply frame, tolerating a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedReply`] when the frame is not a
    /// valid reply.
    pub fn decode(frame: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(frame.trim_ascii_end())
            .map_err(|error| TransportError::MalformedReply(error.into()))
    }

    /// Encodes the frame as a single JSON line.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
