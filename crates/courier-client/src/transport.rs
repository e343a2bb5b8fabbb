//! Contract for the framed connection to the broker.
//!
//! Concrete channels (sockets, pipes, in-process brokers) live outside this
//! crate. The client only relies on [`TransportChannel`] to exchange one
//! request frame for one reply frame, and on [`ChannelConnector`] to open new
//! channels when the pool needs them.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::RequestId;

/// A bidirectional framed connection to the broker.
///
/// The pool hands a channel to exactly one caller at a time, so a frame
/// written through [`send`](Self::send) is never interleaved with another
/// caller's frame on the same channel.
///
/// Dropping a channel must release its connection. The pool drops channels
/// whose exchange was abandoned midway, and a reply still in flight on such a
/// channel must not surface anywhere else.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Writes one request frame and waits for the broker's reply frame.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the connection fails before a reply
    /// arrives.
    async fn send(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Closes the channel.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the shutdown fails.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens channels to the broker on demand.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Establishes a new channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the broker cannot be reached.
    async fn connect(&self) -> Result<Box<dyn TransportChannel>, TransportError>;
}

/// Connection-level failures.
///
/// Most of them are transient and retried; see
/// [`TransportError::is_retryable`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker could not be reached.
    #[error("failed to connect to broker: {message}")]
    Connect {
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// Reading or writing a frame failed (reset, broken pipe, ...).
    #[error("broker connection failed: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The channel was closed before the exchange completed.
    #[error("broker channel closed")]
    Closed,

    /// The client's channel pool was closed; no further channels are handed
    /// out.
    #[error("channel pool closed")]
    PoolClosed,

    /// The broker answered a different request on this channel.
    #[error("reply correlated to request {received}, expected {expected}")]
    Correlation {
        /// Request the reply was awaited for.
        expected: RequestId,
        /// Request the reply actually names.
        received: RequestId,
    },

    /// The reply frame could not be parsed.
    #[error("malformed broker reply: {0}")]
    MalformedReply(#[source] Arc<serde_json::Error>),

    /// The broker reported itself temporarily unavailable.
    #[error("broker unavailable: {message}")]
    Unavailable {
        /// Message supplied by the broker.
        message: String,
    },

    /// The broker answered with a reply that does not fit the request.
    #[error("unexpected '{status}' reply from broker")]
    UnexpectedReply {
        /// Status of the reply that was received.
        status: &'static str,
    },
}

impl TransportError {
    /// Whether another attempt could succeed.
    ///
    /// A closed pool never reopens and a reply of the wrong kind will not
    /// change on resend; everything else is worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::PoolClosed | Self::UnexpectedReply { .. })
    }

    /// Builds a [`TransportError::Connect`] without an I/O cause.
    #[must_use]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
            source: None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}
