//! Errors raised while encoding or decoding job payloads.
//!
//! The numeric codes follow the JSON error numbering the broker ecosystem
//! already reports, so callers that log or forward them stay comparable.

use std::fmt;
use std::str::Utf8Error;

use thiserror::Error;

/// Numeric classification of a [`SerializationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationCode {
    /// The structure nests deeper than the codec allows.
    Depth,
    /// The input is not well-formed JSON.
    Syntax,
    /// The input is not valid UTF-8.
    Utf8,
    /// The value cannot be represented as JSON.
    UnsupportedType,
    /// The top-level value is not a key-value mapping.
    NotAMapping,
}

impl SerializationCode {
    /// Returns the numeric code carried on the error.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Depth => 1,
            Self::Syntax => 4,
            Self::Utf8 => 5,
            Self::UnsupportedType => 8,
            Self::NotAMapping => 9,
        }
    }
}

impl fmt::Display for SerializationCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.as_i32())
    }
}

/// Underlying failure attached to every [`SerializationError`].
#[derive(Debug, Error)]
pub enum CodecFailure {
    /// `serde_json` rejected the value or the input text.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The encoded payload is not valid UTF-8.
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    /// The structure exceeds the nesting limit.
    #[error("maximum nesting depth of {limit} exceeded")]
    DepthExceeded {
        /// Configured nesting limit.
        limit: usize,
    },
    /// The top-level value is not an object.
    #[error("expected a JSON object at the top level, found {found}")]
    NotAMapping {
        /// JSON type that was found instead.
        found: &'static str,
    },
}

/// A payload could not be encoded or decoded.
///
/// The original failure is kept as the error source rather than flattened
/// into the message, so callers can downcast or match on it.
#[derive(Debug, Error)]
#[error("payload serialization failed (code {code}): {message}")]
pub struct SerializationError {
    message: String,
    code: SerializationCode,
    #[source]
    source: CodecFailure,
}

impl SerializationError {
    /// Wraps a codec failure, deriving the message and code from it.
    #[must_use]
    pub fn new(code: SerializationCode, source: CodecFailure) -> Self {
        Self {
            message: source.to_string(),
            code,
            source,
        }
    }

    pub(crate) fn encode(source: serde_json::Error) -> Self {
        Self::new(SerializationCode::UnsupportedType, CodecFailure::Json(source))
    }

    pub(crate) fn decode(source: serde_json::Error) -> Self {
        let code = match source.classify() {
            serde_json::error::Category::Data => SerializationCode::UnsupportedType,
            serde_json::error::Category::Io
            | serde_json::error::Category::Syntax
            | serde_json::error::Category::Eof => SerializationCode::Syntax,
        };
        Self::new(code, CodecFailure::Json(source))
    }

    pub(crate) fn depth(limit: usize) -> Self {
        Self::new(SerializationCode::Depth, CodecFailure::DepthExceeded { limit })
    }

    pub(crate) fn not_a_mapping(found: &'static str) -> Self {
        Self::new(
            SerializationCode::NotAMapping,
            CodecFailure::NotAMapping { found },
        )
    }

    pub(crate) fn utf8(source: Utf8Error) -> Self {
        Self::new(SerializationCode::Utf8, CodecFailure::Utf8(source))
    }

    /// Message of the underlying failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Classification of the failure.
    #[must_use]
    pub const fn kind(&self) -> SerializationCode {
        self.code
    }

    /// Numeric code of the failure.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code.as_i32()
    }

    /// The underlying failure.
    #[must_use]
    pub const fn cause(&self) -> &CodecFailure {
        &self.source
    }
}
