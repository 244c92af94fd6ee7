// In-process broker backend for development and tests.
// Queue semantics mirror the AMQP backend where it matters to callers:
// declare is idempotent, delete of an absent queue succeeds, publish to an
// absent queue fails, and competing consumers on one queue split deliveries.
use crate::{BrokerError, Channel, Delivery, DeliveryStream, Result};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};

/// In-process broker.
///
/// ```
/// use hive_broker::{Broker, Channel as _, MemoryBroker};
///
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     let broker = MemoryBroker::new();
///     let channel = broker.open_channel().await.expect("channel");
///     channel.declare_queue("q1").await.expect("declare");
///     let mut deliveries = channel.consume("q1", "tag").await.expect("consume");
///     channel.publish("q1", b"hello").await.expect("publish");
///     let delivery = futures_util::StreamExt::next(&mut deliveries)
///         .await
///         .expect("delivery");
///     assert_eq!(&delivery.body[..], b"hello");
/// });
/// ```
#[derive(Default)]
pub struct MemoryBroker {
    queues: Arc<RwLock<HashMap<String, MemoryQueue>>>,
}

// One receiver shared by every consumer of the queue; the mutex makes the
// consumers competing rather than broadcast.
#[derive(Clone)]
struct MemoryQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

impl MemoryQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl crate::Broker for MemoryBroker {
    async fn open_channel(&self) -> Result<Box<dyn Channel>> {
        Ok(Box::new(MemoryChannel {
            queues: Arc::clone(&self.queues),
        }))
    }
}

struct MemoryChannel {
    queues: Arc<RwLock<HashMap<String, MemoryQueue>>>,
}

#[async_trait::async_trait]
impl Channel for MemoryChannel {
    async fn declare_queue(&self, name: &str) -> Result<()> {
        let mut queues = self.queues.write().await;
        queues.entry(name.to_string()).or_insert_with(MemoryQueue::new);
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<()> {
        // Dropping the sender ends consumer streams once they drain.
        let mut queues = self.queues.write().await;
        queues.remove(name);
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<()> {
        let queues = self.queues.read().await;
        let entry = queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        entry
            .tx
            .send(Delivery {
                body: bytes::Bytes::copy_from_slice(body),
            })
            .map_err(|_| BrokerError::ConnectionClosed)
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream> {
        let rx = {
            let queues = self.queues.read().await;
            let entry = queues
                .get(queue)
                .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
            Arc::clone(&entry.rx)
        };
        let stream = futures_util::stream::unfold(rx, |rx| async move {
            let delivery = rx.lock().await.recv().await;
            delivery.map(|delivery| (delivery, rx))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Broker;

    #[tokio::test]
    async fn declare_is_idempotent() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue("q").await.unwrap();
        channel.declare_queue("q").await.unwrap();
        channel.publish("q", b"one").await.unwrap();

        let mut deliveries = channel.consume("q", "t").await.unwrap();
        let delivery = deliveries.next().await.unwrap();
        assert_eq!(&delivery.body[..], b"one");
    }

    #[tokio::test]
    async fn delete_absent_queue_succeeds() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.delete_queue("missing").await.unwrap();
    }

    #[tokio::test]
    async fn publish_to_absent_queue_fails() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        let err = channel.publish("missing", b"x").await.unwrap_err();
        assert!(matches!(err, BrokerError::QueueNotFound(_)));
    }

    #[tokio::test]
    async fn competing_consumers_split_the_queue() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue("q").await.unwrap();

        let mut a = channel.consume("q", "a").await.unwrap();
        let mut b = channel.consume("q", "b").await.unwrap();
        channel.publish("q", b"1").await.unwrap();
        channel.publish("q", b"2").await.unwrap();

        // Each delivery goes to exactly one consumer.
        let first = a.next().await.unwrap();
        let second = b.next().await.unwrap();
        let mut bodies = vec![first.body, second.body];
        bodies.sort();
        assert_eq!(bodies, vec![bytes::Bytes::from("1"), bytes::Bytes::from("2")]);
    }

    #[tokio::test]
    async fn delete_ends_consumer_stream_after_drain() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue("q").await.unwrap();
        let mut deliveries = channel.consume("q", "t").await.unwrap();

        channel.publish("q", b"last").await.unwrap();
        channel.delete_queue("q").await.unwrap();

        assert_eq!(&deliveries.next().await.unwrap().body[..], b"last");
        assert!(deliveries.next().await.is_none());
    }
}
