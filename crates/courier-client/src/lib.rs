//! Client core for submitting jobs to a queue broker.
//!
//! Callers hand the [`DispatchClient`] a job type, a payload and optional
//! [`JobOptions`]. The payload is encoded by the [`PayloadCodec`] into a
//! [`JobEnvelope`], which travels to the broker as a single-line JSON frame
//! over a pooled [`TransportChannel`]. The broker's reply resolves the call
//! to a job identifier or a [`DispatchError`].
//!
//! # Architecture
//!
//! The crate owns no sockets. Hosts supply a [`ChannelConnector`] that opens
//! channels to their broker; the [`ChannelPool`] bounds how many are open at
//! once and discards any channel whose exchange did not complete cleanly.
//! Transport failures are retried according to the [`RetryPolicy`], while
//! broker rejections are returned as they are. Every call runs under a
//! deadline, and every client instance owns its own pool and policy.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use courier_client::{ChannelConnector, DispatchClient, DispatchError, JobOptions};
//! use courier_config::Config;
//! use serde_json::json;
//!
//! # async fn example(connector: Arc<dyn ChannelConnector>) {
//! let client = DispatchClient::new(connector, &Config::default());
//! let options = JobOptions::delayed(30).with_pipeline(Some("emails"));
//!
//! match client
//!     .dispatch_with_timeout(
//!         "send_email",
//!         &json!({"to": "x@example.com"}),
//!         Some(&options),
//!         Duration::from_secs(5),
//!     )
//!     .await
//! {
//!     Ok(job_id) => println!("enqueued {job_id}"),
//!     Err(DispatchError::Timeout { .. }) => println!("outcome unknown; resubmit to be sure"),
//!     Err(error) => eprintln!("dispatch failed: {error}"),
//! }
//! # }
//! ```

pub mod codec;
pub mod dispatch;
pub mod envelope;
pub mod options;
pub mod pool;
pub mod protocol;
pub mod retry;
pub mod stat;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use self::codec::{
    CodecFailure, DecodeMode, MAX_DEPTH, Payload, PayloadCodec, SerializationCode,
    SerializationError,
};
pub use self::dispatch::{DispatchClient, DispatchError};
pub use self::envelope::{JobEnvelope, JobId};
pub use self::options::JobOptions;
pub use self::pool::{ChannelPool, PooledChannel};
pub use self::protocol::{
    BrokerCommand, BrokerReply, RejectReason, ReplyFrame, RequestFrame, RequestId,
};
pub use self::retry::RetryPolicy;
pub use self::stat::PipelineStat;
pub use self::telemetry::{TelemetryError, TelemetryHandle};
pub use self::transport::{ChannelConnector, TransportChannel, TransportError};
