//! Inbound messages and the subscriptions that yield them.

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::warn;

use crate::error::BrokerResult;

/// When a consumed message counts as handled by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// The broker forgets a message as soon as it is delivered.
    OnDelivery,
    /// The consumer acknowledges or rejects each message after handling it.
    #[default]
    Manual,
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> BrokerResult<()>;

    async fn reject(&self, requeue: bool) -> BrokerResult<()>;
}

/// Used for deliveries the broker already considers settled.
struct Settled;

#[async_trait]
impl Acknowledger for Settled {
    async fn ack(&self) -> BrokerResult<()> {
        Ok(())
    }

    async fn reject(&self, _requeue: bool) -> BrokerResult<()> {
        Ok(())
    }
}

/// A message taken off a queue.
pub struct Delivery {
    body: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

impl Delivery {
    pub fn new(body: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, redelivered, acker }
    }

    /// A delivery that needs no acknowledgement; `ack` and `reject` are no-ops.
    pub fn settled(body: Vec<u8>, redelivered: bool) -> Self {
        Self::new(body, redelivered, Box::new(Settled))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub const fn is_redelivered(&self) -> bool {
        self.redelivered
    }

    /// Marks the message as handled.
    ///
    /// # Errors
    /// Returns an error if the broker cannot be told.
    pub async fn ack(&self) -> BrokerResult<()> {
        self.acker.ack().await
    }

    /// Gives the message back to the broker, putting it back on its queue
    /// when `requeue` is set and dropping it otherwise.
    ///
    /// # Errors
    /// Returns an error if the broker cannot be told.
    pub async fn reject(&self, requeue: bool) -> BrokerResult<()> {
        self.acker.reject(requeue).await
    }
}

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A live consumer on one queue.
///
/// Holds a broker channel until [`Subscription::release`] is awaited. A
/// subscription dropped without being released spawns its release on the
/// current runtime.
pub struct Subscription {
    deliveries: BoxStream<'static, BrokerResult<Delivery>>,
    release: Option<ReleaseFn>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn new<R>(deliveries: BoxStream<'static, BrokerResult<Delivery>>, release: R) -> Self
    where
        R: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        Self { deliveries, release: Some(Box::new(release)) }
    }

    /// Waits for the next delivery. `None` means the broker ended the stream.
    pub async fn next(&mut self) -> Option<BrokerResult<Delivery>> {
        self.deliveries.next().await
    }

    /// Stops consuming and returns the channel to its owner.
    pub async fn release(mut self) {
        if let Some(release) = self.release.take() {
            release().await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(release());
                }
                Err(_) => warn!("Subscription dropped outside a runtime, channel not released"),
            }
        }
    }
}
