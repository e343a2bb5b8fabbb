//! Bounded pool of broker channels.
//!
//! Channels are opened lazily through a [`ChannelConnector`] and handed out
//! one caller at a time. A [`PooledChannel`] only goes back to the idle list
//! when its holder calls [`PooledChannel::release`] after a clean exchange.
//! After a failure the holder calls [`PooledChannel::discard`], which closes
//! the channel. A lease dropped early (the call was cancelled or timed out)
//! takes its channel with it unclosed, so a late reply left on that channel
//! can never be read by the next caller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

use crate::transport::{ChannelConnector, TransportChannel, TransportError};

pub(crate) const POOL_TARGET: &str = "courier::pool";

type Channel = Box<dyn TransportChannel>;

/// Shares a bounded set of channels between concurrent callers.
pub struct ChannelPool {
    connector: Arc<dyn ChannelConnector>,
    idle: Mutex<Vec<Channel>>,
    permits: Semaphore,
    size: usize,
}

impl ChannelPool {
    /// Creates a pool holding at most `size` open channels (at least one).
    #[must_use]
    pub fn new(connector: Arc<dyn ChannelConnector>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            connector,
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Semaphore::new(size),
            size,
        }
    }

    /// Maximum number of open channels.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of open channels waiting to be reused.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle_channels().len()
    }

    /// Waits for a free slot and returns a channel, opening one if no idle
    /// channel is available.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PoolClosed`] once the pool is closed, or the
    /// connector's error when a new channel cannot be opened.
    pub async fn checkout(&self) -> Result<PooledChannel<'_>, TransportError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransportError::PoolClosed)?;

        let reused = self.idle_channels().pop();
        let channel = match reused {
            Some(channel) => channel,
            None => {
                debug!(target: POOL_TARGET, "opening broker channel");
                self.connector.connect().await?
            }
        };

        Ok(PooledChannel {
            pool: self,
            channel: Some(channel),
            _permit: permit,
        })
    }

    /// Stops handing out channels and closes the idle ones.
    ///
    /// Leases already checked out close their channel when released.
    pub async fn close(&self) {
        self.permits.close();
        let drained: Vec<Channel> = self.idle_channels().drain(..).collect();
        for channel in drained {
            close_channel(channel).await;
        }
    }

    fn idle_channels(&self) -> MutexGuard<'_, Vec<Channel>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive use of one pooled channel.
pub struct PooledChannel<'pool> {
    pool: &'pool ChannelPool,
    channel: Option<Channel>,
    _permit: SemaphorePermit<'pool>,
}

impl PooledChannel<'_> {
    /// Exchanges one frame over the leased channel.
    ///
    /// # Errors
    ///
    /// Propagates the channel's [`TransportError`].
    pub async fn send(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self.channel.as_ref() {
            Some(channel) => channel.send(frame).await,
            None => Err(TransportError::Closed),
        }
    }

    /// Returns the channel to the pool for reuse, or closes it when the pool
    /// has been closed meanwhile.
    pub async fn release(mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        let closed = {
            let mut idle = self.pool.idle_channels();
            if self.pool.permits.is_closed() {
                Some(channel)
            } else {
                idle.push(channel);
                None
            }
        };
        if let Some(channel) = closed {
            close_channel(channel).await;
        }
    }

    /// Closes the channel instead of returning it to the pool.
    ///
    /// Used after an exchange failed; the slot becomes free for a fresh
    /// channel.
    pub async fn discard(mut self) {
        if let Some(channel) = self.channel.take() {
            debug!(target: POOL_TARGET, "closing failed broker channel");
            close_channel(channel).await;
        }
    }
}

async fn close_channel(channel: Channel) {
    if let Err(error) = channel.close().await {
        warn!(target: POOL_TARGET, %error, "failed to close broker channel");
    }
}

impl Drop for PooledChannel<'_> {
    fn drop(&mut self) {
        if self.channel.take().is_some() {
            debug!(target: POOL_TARGET, "discarding broker channel");
        }
    }
}
