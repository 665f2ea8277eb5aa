//! In-process broker.
//!
//! Queues live in memory and are shared by every clone of the broker.
//! Publishes and consumes can be made to fail on demand to rehearse
//! broker outages.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::Notify;
use tracing::debug;

use crate::delivery::{AckMode, Acknowledger, Delivery, Subscription};
use crate::error::{BrokerError, BrokerResult};
use crate::{Publisher, Subscriber};

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    notify: Notify,
    unavailable: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn queues(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Vec<u8>>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("in-memory broker marked unavailable".to_string()));
        }
        Ok(())
    }

    fn pop(&self, queue: &str) -> Option<Vec<u8>> {
        self.queues().get_mut(queue).and_then(VecDeque::pop_front)
    }
}

/// Broker whose queues are plain in-process deques.
///
/// Every successful publish is also appended to a log read by
/// [`published`](Self::published). The log is never trimmed; memory grows
/// with every publish for the lifetime of the broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
    ack_mode: AckMode,
}

impl fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBroker").field("ack_mode", &self.ack_mode).finish_non_exhaustive()
    }
}

impl InMemoryBroker {
    /// Creates a broker with no queues that settles deliveries per `ack_mode`.
    pub fn new(ack_mode: AckMode) -> Self {
        Self { shared: Arc::default(), ack_mode }
    }

    /// Messages waiting on `queue`, oldest first.
    pub fn pending(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared.queues().get(queue).map(|q| q.iter().cloned().collect()).unwrap_or_default()
    }

    /// Every successful publish so far, in order, as `(queue, payload)`.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.shared.published.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.queues().keys().cloned().collect();
        names.sort();
        names
    }

    /// Makes every publish and consume call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Appends a message to `queue` without going through `publish`.
    pub fn push(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.shared.queues().entry(queue.to_string()).or_default().push_back(payload.into());
        self.shared.notify.notify_waiters();
    }

    /// Ends every open subscription and refuses further calls.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn declare_queues(&self, queues: &[String]) -> BrokerResult<()> {
        self.shared.ensure_available()?;
        let mut declared = self.shared.queues();
        for queue in queues {
            declared.entry(queue.clone()).or_default();
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> BrokerResult<()> {
        self.shared.ensure_available()?;
        self.shared
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((queue.to_string(), payload.to_vec()));
        self.push(queue, payload);
        debug!(queue, bytes = payload.len(), "Published message");
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    async fn consume(&self, queue: &str) -> BrokerResult<Subscription> {
        self.shared.ensure_available()?;
        self.shared.queues().entry(queue.to_string()).or_default();

        let queue = queue.to_string();
        let ack_mode = self.ack_mode;
        let deliveries = futures::stream::unfold(Arc::clone(&self.shared), move |shared| {
            let queue = queue.clone();
            async move {
                let body = loop {
                    let notified = shared.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    if shared.closed.load(Ordering::SeqCst) {
                        return None;
                    }
                    if let Some(body) = shared.pop(&queue) {
                        break body;
                    }
                    notified.await;
                };

                let delivery = match ack_mode {
                    AckMode::OnDelivery => Delivery::settled(body, false),
                    AckMode::Manual => {
                        let acker = MemoryAcker {
                            shared: Arc::clone(&shared),
                            queue: queue.clone(),
                            body: body.clone(),
                        };
                        Delivery::new(body, false, Box::new(acker))
                    }
                };
                Some((Ok(delivery), shared))
            }
        })
        .boxed();

        Ok(Subscription::new(deliveries, || -> BoxFuture<'static, ()> { Box::pin(async {}) }))
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    queue: String,
    body: Vec<u8>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> BrokerResult<()> {
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> BrokerResult<()> {
        if requeue {
            self.shared
                .queues()
                .entry(self.queue.clone())
                .or_default()
                .push_front(self.body.clone());
            self.shared.notify.notify_waiters();
        }
        Ok(())
    }
}
