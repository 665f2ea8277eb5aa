//! Vigil Broker
//!
//! Message broker plumbing for the model lifecycle:
//! - A bounded cache of reusable protocol channels (`ChannelPool`)
//! - An AMQP 0-9-1 broker built on that pool (`AmqpBroker`)
//! - An in-process broker with the same surface (`InMemoryBroker`)
//! - Deliveries with explicit or automatic acknowledgement (`Delivery`, `Subscription`)

pub mod amqp;
pub mod delivery;
pub mod error;
pub mod memory;
pub mod pool;
pub mod retry;

use async_trait::async_trait;

pub use amqp::{AmqpBroker, AmqpConfig};
pub use delivery::{AckMode, Acknowledger, Delivery, Subscription};
pub use error::{BrokerError, BrokerResult};
pub use memory::InMemoryBroker;
pub use pool::{ChannelManager, ChannelPool};
pub use retry::do_with_tries;

/// Sends payloads to named queues.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Declares every queue in `queues`. Declaring an existing queue is a no-op.
    async fn declare_queues(&self, queues: &[String]) -> BrokerResult<()>;

    /// Publishes `payload` to `queue`, declaring the queue first if absent.
    async fn publish(&self, queue: &str, payload: &[u8]) -> BrokerResult<()>;
}

/// Opens long-lived subscriptions to named queues.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Declares `queue` and starts consuming from it.
    ///
    /// The returned subscription owns a broker channel until it is released.
    async fn consume(&self, queue: &str) -> BrokerResult<Subscription>;
}
