// Broker adapter for per-tenant message queues.
// The rest of the system talks to the broker exclusively through the
// `Broker`/`Channel` traits so the AMQP backend and the in-process backend
// are interchangeable.
use bytes::Bytes;
use futures_util::stream::BoxStream;
use uuid::Uuid;

pub mod amqp;
pub mod memory;

pub use amqp::AmqpBroker;
pub use memory::MemoryBroker;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),
    #[error("broker connection closed")]
    ConnectionClosed,
    #[error("transport error: {0}")]
    Transport(String),
}

/// A single message handed to a consumer.
///
/// Deliveries are acknowledged at consumption time (auto-ack); once a
/// delivery is yielded by a stream the broker has already forgotten it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Bytes,
}

/// Lazy sequence of deliveries from one queue.
///
/// The stream is infinite under normal operation and ends when the channel
/// or connection closes, or when the queue is deleted.
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// Queue naming scheme shared by the publisher and the consumer pools.
pub fn tenant_queue_name(tenant_id: &Uuid) -> String {
    format!("tenant_{tenant_id}_queue")
}

/// Handle to a message broker. Long-lived; one per process.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Open a fresh multiplexed channel on the shared connection.
    ///
    /// Channels are cheap and never shared across tasks; callers open one,
    /// use it, and close it, unless a long-running consumer holds it open.
    async fn open_channel(&self) -> Result<Box<dyn Channel>>;
}

/// A short-lived unit of broker work.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    /// Declare a durable, non-exclusive, non-auto-delete queue.
    /// Idempotent: succeeds whether or not the queue already existed.
    async fn declare_queue(&self, name: &str) -> Result<()>;

    /// Delete a queue. Succeeds if the queue is already absent.
    async fn delete_queue(&self, name: &str) -> Result<()>;

    /// Publish `body` to the default exchange with the queue name as routing
    /// key, content type `application/json`. Non-mandatory, non-immediate.
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<()>;

    /// Begin consuming in auto-acknowledge mode.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_embed_tenant_id() {
        let id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        assert_eq!(
            tenant_queue_name(&id),
            "tenant_11111111-1111-1111-1111-111111111111_queue"
        );
    }
}
