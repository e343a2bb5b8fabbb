//! Scripted broker used by unit and behavioural tests.
//!
//! Every channel opened by a [`ScriptedBroker`] shares one script of
//! [`Step`]s and records the request frames it receives, so tests can assert
//! on exactly what reached the broker.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::JobId;
use crate::protocol::{BrokerReply, RejectReason, ReplyFrame, RequestFrame, RequestId};
use crate::stat::PipelineStat;
use crate::transport::{ChannelConnector, TransportChannel, TransportError};

/// What the broker does with the next request frame.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Answer the request with this body.
    Reply(BrokerReply),
    /// Answer after a delay.
    Delayed(Duration, BrokerReply),
    /// Answer as though the frame belonged to another request.
    ReplyFor(RequestId, BrokerReply),
    /// Write raw bytes back.
    Raw(Vec<u8>),
    /// Fail the exchange with an I/O error.
    Fail(io::ErrorKind),
    /// Never answer.
    Hang,
}

impl Step {
    pub(crate) fn accept(job_id: &str) -> Self {
        Self::Reply(BrokerReply::Accepted {
            job_id: JobId::from(job_id),
        })
    }

    pub(crate) fn reject(reason: RejectReason, message: &str) -> Self {
        Self::Reply(BrokerReply::Rejected {
            reason,
            message: message.to_owned(),
        })
    }

    pub(crate) fn unavailable(message: &str) -> Self {
        Self::Reply(BrokerReply::Unavailable {
            message: message.to_owned(),
        })
    }

    pub(crate) fn stats(pipelines: Vec<PipelineStat>) -> Self {
        Self::Reply(BrokerReply::Stats { pipelines })
    }

    pub(crate) const fn reset() -> Self {
        Self::Fail(io::ErrorKind::ConnectionReset)
    }
}

#[derive(Default)]
struct BrokerState {
    steps: VecDeque<Step>,
    frames: Vec<RequestFrame>,
    connects: usize,
    closes: usize,
    refused_connects: usize,
}

/// Connector whose channels follow a shared script.
#[derive(Clone, Default)]
pub(crate) struct ScriptedBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl ScriptedBroker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let broker = Self::new();
        for step in steps {
            broker.push(step);
        }
        broker
    }

    pub(crate) fn push(&self, step: Step) {
        self.state().steps.push_back(step);
    }

    pub(crate) fn refuse_connects(&self, count: usize) {
        self.state().refused_connects = count;
    }

    pub(crate) fn frames(&self) -> Vec<RequestFrame> {
        self.state().frames.clone()
    }

    pub(crate) fn request_ids(&self) -> Vec<RequestId> {
        self.frames()
            .into_iter()
            .map(|frame| frame.request_id)
            .collect()
    }

    pub(crate) fn connects(&self) -> usize {
        self.state().connects
    }

    pub(crate) fn closes(&self) -> usize {
        self.state().closes
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, frame: &[u8]) -> (RequestId, Option<Step>) {
        let request: RequestFrame =
            serde_json::from_slice(frame.trim_ascii_end()).expect("client sent a malformed frame");
        let request_id = request.request_id.clone();
        let mut state = self.state();
        state.frames.push(request);
        (request_id, state.steps.pop_front())
    }
}

#[async_trait]
impl ChannelConnector for ScriptedBroker {
    async fn connect(&self) -> Result<Box<dyn TransportChannel>, TransportError> {
        let mut state = self.state();
        if state.refused_connects > 0 {
            state.refused_connects -= 1;
            return Err(TransportError::connect("connection refused"));
        }
        state.connects += 1;
        Ok(Box::new(ScriptedChannel {
            broker: self.clone(),
        }))
    }
}

struct ScriptedChannel {
    broker: ScriptedBroker,
}

fn reply(request_id: RequestId, reply: BrokerReply) -> Vec<u8> {
    ReplyFrame { request_id, reply }
        .encode()
        .expect("reply frames encode")
}

#[async_trait]
impl TransportChannel for ScriptedChannel {
    async fn send(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let (request_id, step) = self.broker.record(frame);
        match step {
            Some(Step::Reply(body)) => Ok(reply(request_id, body)),
            Some(Step::Delayed(delay, body)) => {
                tokio::time::sleep(delay).await;
                Ok(reply(request_id, body))
            }
            Some(Step::ReplyFor(other, body)) => Ok(reply(other, body)),
            Some(Step::Raw(bytes)) => Ok(bytes),
            Some(Step::Fail(kind)) => Err(io::Error::from(kind).into()),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.broker.state().closes += 1;
        Ok(())
    }
}
