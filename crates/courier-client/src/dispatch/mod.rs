//! Job submission over pooled broker channels.
//!
//! A dispatch call moves through fixed stages: the envelope is built and its
//! payload encoded synchronously, then the request frame is exchanged with
//! the broker. Only the exchange suspends. Transport failures and
//! "unavailable" replies are retried with exponential backoff up to the
//! attempt budget; rejections end the call at once. Every retry resends the
//! identical frame, request id included.
//!
//! The whole exchange runs under the caller's deadline. When it elapses, or
//! when the caller drops the future, the in-flight channel lease is dropped
//! and its channel discarded, so a reply arriving later cannot be mistaken
//! for the answer to another call.

mod errors;

use std::sync::Arc;
use std::time::Duration;

use courier_config::Config;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use self::errors::DispatchError;
use crate::codec::{PayloadCodec, SerializationError};
use crate::envelope::{JobEnvelope, JobId};
use crate::options::JobOptions;
use crate::pool::{ChannelPool, PooledChannel};
use crate::protocol::{BrokerReply, RejectReason, ReplyFrame, RequestFrame, RequestId};
use crate::retry::RetryPolicy;
use crate::stat::PipelineStat;
use crate::transport::{ChannelConnector, TransportError};

pub(crate) const DISPATCH_TARGET: &str = "courier::dispatch";

/// Submits jobs to the broker.
///
/// The client is safe to share between tasks; every call is an independent
/// unit of work with its own outcome. Jobs are neither batched nor reordered.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use courier_client::{ChannelConnector, DispatchClient, JobOptions};
/// use courier_config::Config;
/// use serde_json::json;
///
/// # async fn example(connector: Arc<dyn ChannelConnector>) -> Result<(), courier_client::DispatchError> {
/// let client = DispatchClient::new(connector, &Config::default());
/// let job_id = client
///     .dispatch(
///         "mail.send",
///         &json!({"to": "x@example.com"}),
///         Some(&JobOptions::delayed(30)),
///     )
///     .await?;
/// println!("enqueued {job_id}");
/// # Ok(())
/// # }
/// ```
pub struct DispatchClient {
    pool: ChannelPool,
    codec: PayloadCodec,
    retry: RetryPolicy,
    default_timeout: Duration,
    retry_saturated: bool,
}

/// Why an attempt did not settle the call.
enum AttemptFailure {
    Transport(TransportError),
    Saturated(String),
}

impl DispatchClient {
    /// Creates a client whose pool and retry policy follow `config`.
    #[must_use]
    pub fn new(connector: Arc<dyn ChannelConnector>, config: &Config) -> Self {
        Self {
            pool: ChannelPool::new(connector, config.pool_size()),
            codec: PayloadCodec::new(),
            retry: RetryPolicy::from_config(config),
            default_timeout: config.dispatch_timeout(),
            retry_saturated: config.retry_saturated(),
        }
    }

    /// Replaces the payload codec.
    #[must_use]
    pub const fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Codec used for payloads.
    #[must_use]
    pub const fn codec(&self) -> &PayloadCodec {
        &self.codec
    }

    /// Pool the client sends through.
    #[must_use]
    pub const fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    /// Builds an envelope and encodes its payload without sending anything.
    ///
    /// Missing options fall back to [`JobOptions::new`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Serialization`] when the payload cannot be
    /// encoded.
    pub fn prepare<T>(
        &self,
        job_type: &str,
        payload: &T,
        options: Option<&JobOptions>,
    ) -> Result<JobEnvelope, DispatchError>
    where
        T: Serialize + ?Sized,
    {
        let defaults = JobOptions::new();
        JobEnvelope::encode(
            &self.codec,
            None,
            job_type,
            payload,
            options.unwrap_or(&defaults),
        )
        .map_err(Into::into)
    }

    /// Dispatches a job under the configured default deadline.
    ///
    /// # Errors
    ///
    /// See [`DispatchClient::dispatch_with_timeout`].
    pub async fn dispatch<T>(
        &self,
        job_type: &str,
        payload: &T,
        options: Option<&JobOptions>,
    ) -> Result<JobId, DispatchError>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.dispatch_with_timeout(job_type, payload, options, self.default_timeout)
            .await
    }

    /// Dispatches a job and returns the id the broker acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Serialization`] before any network activity
    /// when the payload cannot be encoded, [`DispatchError::Rejected`] when
    /// the broker refuses the job, [`DispatchError::Timeout`] when `timeout`
    /// elapses first, and [`DispatchError::Transport`] once the attempt
    /// budget is spent.
    pub async fn dispatch_with_timeout<T>(
        &self,
        job_type: &str,
        payload: &T,
        options: Option<&JobOptions>,
        timeout: Duration,
    ) -> Result<JobId, DispatchError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let envelope = self.prepare(job_type, payload, options)?;
        self.submit(&envelope, timeout).await
    }

    /// Sends a prepared envelope.
    ///
    /// The request id is the envelope id, so submitting the same envelope
    /// again after a timeout lets the broker discard the duplicate.
    ///
    /// # Errors
    ///
    /// As for [`DispatchClient::dispatch_with_timeout`], minus serialization
    /// of the payload; an envelope whose payload is not UTF-8 text fails with
    /// [`DispatchError::Serialization`].
    pub async fn submit(
        &self,
        envelope: &JobEnvelope,
        timeout: Duration,
    ) -> Result<JobId, DispatchError> {
        let frame = RequestFrame::push(envelope.clone());
        let request_id = frame.request_id.clone();
        let bytes = frame.encode().map_err(SerializationError::encode)?;

        debug!(
            target: DISPATCH_TARGET,
            request_id = %request_id,
            job = envelope.job_type(),
            pipeline = envelope.options().pipeline(),
            delay = envelope.options().delay(),
            "dispatching job"
        );

        match self.exchange_within(&request_id, &bytes, timeout).await? {
            (BrokerReply::Accepted { job_id }, _) => {
                info!(
                    target: DISPATCH_TARGET,
                    request_id = %request_id,
                    job_id = %job_id,
                    "job accepted"
                );
                Ok(job_id)
            }
            (other, attempts) => Err(unexpected(request_id, attempts, &other)),
        }
    }

    /// Fetches per-pipeline statistics from the broker.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Timeout`], [`DispatchError::Rejected`] or
    /// [`DispatchError::Transport`] as for dispatch.
    pub async fn stat(&self, timeout: Duration) -> Result<Vec<PipelineStat>, DispatchError> {
        let frame = RequestFrame::stat();
        let request_id = frame.request_id.clone();
        let bytes = frame.encode().map_err(SerializationError::encode)?;

        match self.exchange_within(&request_id, &bytes, timeout).await? {
            (BrokerReply::Stats { pipelines }, _) => Ok(pipelines),
            (other, attempts) => Err(unexpected(request_id, attempts, &other)),
        }
    }

    /// Closes idle channels; later calls fail at once with
    /// [`TransportError::PoolClosed`].
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn exchange_within(
        &self,
        request_id: &RequestId,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<(BrokerReply, u32), DispatchError> {
        if let Ok(outcome) = tokio::time::timeout(timeout, self.exchange(request_id, frame)).await {
            return outcome;
        }
        warn!(
            target: DISPATCH_TARGET,
            request_id = %request_id,
            timeout_ms = timeout.as_millis(),
            "no acknowledgement before the deadline; outcome unknown"
        );
        Err(DispatchError::Timeout {
            request_id: request_id.clone(),
            after: timeout,
        })
    }

    /// Runs attempts until one settles the call.
    ///
    /// A settled reply comes back with the number of attempts it took.
    async fn exchange(
        &self,
        request_id: &RequestId,
        frame: &[u8],
    ) -> Result<(BrokerReply, u32), DispatchError> {
        let mut attempt = 1u32;
        loop {
            let failure = match self.attempt(request_id, frame).await {
                Ok(BrokerReply::Rejected {
                    reason: RejectReason::Saturated,
                    message,
                }) if self.retry_saturated => AttemptFailure::Saturated(message),
                Ok(BrokerReply::Rejected { reason, message }) => {
                    warn!(
                        target: DISPATCH_TARGET,
                        request_id = %request_id,
                        %reason,
                        message = message.as_str(),
                        "broker rejected request"
                    );
                    return Err(DispatchError::Rejected {
                        request_id: request_id.clone(),
                        reason,
                        message,
                    });
                }
                Ok(BrokerReply::Unavailable { message }) => {
                    AttemptFailure::Transport(TransportError::Unavailable { message })
                }
                Ok(reply) => return Ok((reply, attempt)),
                Err(error) => AttemptFailure::Transport(error),
            };

            if attempt >= self.retry.max_attempts() || !failure.is_retryable() {
                return Err(give_up(request_id, attempt, failure));
            }

            let delay = self.retry.backoff(attempt);
            match &failure {
                AttemptFailure::Transport(error) => warn!(
                    target: DISPATCH_TARGET,
                    request_id = %request_id,
                    attempt,
                    backoff_ms = delay.as_millis(),
                    %error,
                    "transport attempt failed; retrying"
                ),
                AttemptFailure::Saturated(message) => warn!(
                    target: DISPATCH_TARGET,
                    request_id = %request_id,
                    attempt,
                    backoff_ms = delay.as_millis(),
                    message = message.as_str(),
                    "pipeline saturated; retrying"
                ),
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One exchange on one leased channel.
    ///
    /// The lease goes back to the pool only after a well-formed reply for
    /// this request; a failed exchange closes its channel. A lease dropped
    /// mid-exchange discards the channel without closing it.
    async fn attempt(
        &self,
        request_id: &RequestId,
        frame: &[u8],
    ) -> Result<BrokerReply, TransportError> {
        let lease = self.pool.checkout().await?;
        match exchange_on(&lease, request_id, frame).await {
            Ok(reply) => {
                lease.release().await;
                Ok(reply)
            }
            Err(error) => {
                lease.discard().await;
                Err(error)
            }
        }
    }
}

impl AttemptFailure {
    const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_retryable(),
            Self::Saturated(_) => true,
        }
    }
}

async fn exchange_on(
    lease: &PooledChannel<'_>,
    request_id: &RequestId,
    frame: &[u8],
) -> Result<BrokerReply, TransportError> {
    let bytes = lease.send(frame).await?;
    let reply = ReplyFrame::decode(&bytes)?;
    if reply.request_id != *request_id {
        return Err(TransportError::Correlation {
            expected: request_id.clone(),
            received: reply.request_id,
        });
    }
    Ok(reply.reply)
}

fn give_up(request_id: &RequestId, attempts: u32, failure: AttemptFailure) -> DispatchError {
    match failure {
        AttemptFailure::Transport(source) => DispatchError::Transport {
            request_id: request_id.clone(),
            attempts,
            source,
        },
        AttemptFailure::Saturated(message) => DispatchError::Rejected {
            request_id: request_id.clone(),
            reason: RejectReason::Saturated,
            message,
        },
    }
}

fn unexpected(request_id: RequestId, attempts: u32, reply: &BrokerReply) -> DispatchError {
    DispatchError::Transport {
        request_id,
        attempts,
        source: TransportError::UnexpectedReply {
            status: reply.status(),
        },
    }
}
