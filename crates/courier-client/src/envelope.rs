//! The unit of transmission exchanged with the broker.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Payload, PayloadCodec, SerializationError};
use crate::options::JobOptions;

/// Identifier of a job, assigned by the client or the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered identifier.
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

impl fmt::Display for JobId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A serialized job ready for submission.
///
/// The envelope owns a snapshot of the options it was built with; changing
/// the caller's options afterwards cannot affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    id: JobId,
    job: String,
    #[serde(with = "payload_text")]
    payload: Vec<u8>,
    options: JobOptions,
}

impl JobEnvelope {
    /// Builds an envelope around an already serialized payload, generating
    /// an identifier.
    #[must_use]
    pub fn new(job_type: impl Into<String>, payload: Vec<u8>, options: &JobOptions) -> Self {
        Self::with_id(JobId::generate(), job_type, payload, options)
    }

    /// Builds an envelope with a caller-chosen identifier.
    #[must_use]
    pub fn with_id(
        id: JobId,
        job_type: impl Into<String>,
        payload: Vec<u8>,
        options: &JobOptions,
    ) -> Self {
        Self {
            id,
            job: job_type.into(),
            payload,
            options: options.clone(),
        }
    }

    /// Serializes `payload` with `codec` and wraps the result.
    ///
    /// # Errors
    ///
    /// Returns the codec's [`SerializationError`] unchanged.
    pub fn encode<T>(
        codec: &PayloadCodec,
        id: Option<JobId>,
        job_type: &str,
        payload: &T,
        options: &JobOptions,
    ) -> Result<Self, SerializationError>
    where
        T: Serialize + ?Sized,
    {
        let bytes = codec.serialize(payload)?;
        Ok(Self::with_id(
            id.unwrap_or_else(JobId::generate),
            job_type,
            bytes,
            options,
        ))
    }

    /// Job identifier.
    #[must_use]
    pub const fn id(&self) -> &JobId {
        &self.id
    }

    /// Name of the handler on the worker side.
    #[must_use]
    pub fn job_type(&self) -> &str {
        self.job.as_str()
    }

    /// Serialized payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Options snapshot taken at construction.
    #[must_use]
    pub const fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Decodes the payload back into a mapping.
    ///
    /// # Errors
    ///
    /// Returns the codec's [`SerializationError`] unchanged.
    pub fn decode_payload(&self, codec: &PayloadCodec) -> Result<Payload, SerializationError> {
        codec.unserialize(&self.payload)
    }
}

/// Carries the payload bytes as a JSON string inside the envelope.
mod payload_text {
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let text = std::str::from_utf8(bytes).map_err(S::Error::custom)?;
        serializer.serialize_str(text)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        String::deserialize(deserializer).map(String::into_bytes)
    }
}
