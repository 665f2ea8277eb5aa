//! Bounded cache of reusable broker channels.
//!
//! The pool never blocks: acquiring from an empty pool opens a fresh
//! channel, and releasing into a full pool closes the surplus channel.
//! The capacity therefore bounds how many idle channels are kept, not how
//! many can be in use at once.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::BrokerResult;

/// Opens and closes the channels a [`ChannelPool`] hands out.
#[async_trait]
pub trait ChannelManager: Send + Sync + 'static {
    type Channel: Send + 'static;

    /// Opens a new channel on the underlying connection.
    async fn open(&self) -> BrokerResult<Self::Channel>;

    /// Closes a channel that is no longer cached. Failures are logged, not returned.
    async fn close(&self, channel: Self::Channel);

    /// Whether a released channel may be handed out again.
    fn is_reusable(&self, _channel: &Self::Channel) -> bool {
        true
    }
}

/// Idle channels cached for reuse, at most `capacity` of them.
pub struct ChannelPool<M: ChannelManager> {
    manager: M,
    idle: Mutex<Vec<M::Channel>>,
    capacity: usize,
}

impl<M: ChannelManager> fmt::Debug for ChannelPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPool")
            .field("capacity", &self.capacity)
            .field("idle", &self.idle_count())
            .finish_non_exhaustive()
    }
}

impl<M: ChannelManager> ChannelPool<M> {
    /// Creates an empty pool that caches at most `capacity` idle channels.
    pub fn new(manager: M, capacity: usize) -> Self {
        Self { manager, idle: Mutex::new(Vec::with_capacity(capacity)), capacity }
    }

    /// Opens channels until the pool holds `capacity` idle channels.
    ///
    /// # Errors
    /// Returns the first error from opening a channel; channels opened
    /// before the failure stay cached.
    pub async fn prefill(&self) -> BrokerResult<()> {
        while self.idle_count() < self.capacity {
            let channel = self.manager.open().await?;
            if let Some(surplus) = self.push(channel) {
                self.manager.close(surplus).await;
                break;
            }
        }
        info!(capacity = self.capacity, "Channel pool filled");
        Ok(())
    }

    /// Takes a cached channel, or opens a new one when none is idle.
    ///
    /// # Errors
    /// Returns an error if a new channel cannot be opened.
    pub async fn acquire(&self) -> BrokerResult<M::Channel> {
        let cached = self.lock().pop();
        match cached {
            Some(channel) => Ok(channel),
            None => {
                debug!("Channel pool empty, opening a new channel");
                self.manager.open().await
            }
        }
    }

    /// Returns a channel to the pool, closing it if the pool is full or the
    /// channel can no longer be used.
    pub async fn release(&self, channel: M::Channel) {
        if !self.manager.is_reusable(&channel) {
            debug!("Discarding unusable channel");
            self.manager.close(channel).await;
            return;
        }
        if let Some(surplus) = self.push(channel) {
            debug!("Channel pool full, closing surplus channel");
            self.manager.close(surplus).await;
        }
    }

    /// Closes every idle channel.
    pub async fn close_idle(&self) {
        let drained: Vec<_> = self.lock().drain(..).collect();
        let count = drained.len();
        for channel in drained {
            self.manager.close(channel).await;
        }
        debug!(count, "Closed idle channels");
    }

    /// Channels currently cached and ready to hand out.
    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    /// Caches `channel`, handing it back when the pool is already full.
    fn push(&self, channel: M::Channel) -> Option<M::Channel> {
        let mut idle = self.lock();
        if idle.len() < self.capacity {
            idle.push(channel);
            None
        } else {
            Some(channel)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<M::Channel>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
