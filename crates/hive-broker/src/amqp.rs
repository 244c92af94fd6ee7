// AMQP 0.9.1 backend. One long-lived connection; channels are opened per
// operation or held by a consumer for the lifetime of its pool.
use crate::{BrokerError, Channel, Delivery, DeliveryStream, Result};
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};

const REPLY_SUCCESS: u16 = 200;

pub struct AmqpBroker {
    conn: Connection,
}

impl AmqpBroker {
    /// Connect to the broker. The connection is shared for the process
    /// lifetime; transport errors on it are surfaced to callers, not retried.
    pub async fn connect(url: &str) -> Result<Self> {
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(transport)?;
        tracing::info!("connected to AMQP broker");
        Ok(Self { conn })
    }

    pub async fn close(&self) -> Result<()> {
        self.conn
            .close(REPLY_SUCCESS, "shutdown")
            .await
            .map_err(transport)
    }
}

#[async_trait::async_trait]
impl crate::Broker for AmqpBroker {
    async fn open_channel(&self) -> Result<Box<dyn Channel>> {
        if !self.conn.status().connected() {
            return Err(BrokerError::ConnectionClosed);
        }
        let channel = self.conn.create_channel().await.map_err(transport)?;
        Ok(Box::new(AmqpChannel { channel }))
    }
}

struct AmqpChannel {
    channel: lapin::Channel,
}

#[async_trait::async_trait]
impl Channel for AmqpChannel {
    async fn declare_queue(&self, name: &str) -> Result<()> {
        let options = QueueDeclareOptions {
            durable: true,
            auto_delete: false,
            exclusive: false,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(name, options, FieldTable::default())
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<()> {
        self.channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<()> {
        // Default (nameless) exchange routes by queue name.
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let options = BasicConsumeOptions {
            no_ack: true,
            ..BasicConsumeOptions::default()
        };
        let consumer = self
            .channel
            .basic_consume(queue, consumer_tag, options, FieldTable::default())
            .await
            .map_err(transport)?;

        // A transport error ends the stream; the owning pool treats stream
        // end as terminal and does not resubscribe.
        let stream = futures_util::stream::unfold(consumer, |mut consumer| async move {
            match consumer.next().await {
                Some(Ok(delivery)) => {
                    let body = bytes::Bytes::from(delivery.data);
                    Some((Delivery { body }, consumer))
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "delivery stream failed");
                    None
                }
                None => None,
            }
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        self.channel
            .close(REPLY_SUCCESS, "done")
            .await
            .map_err(transport)
    }
}

fn transport(err: lapin::Error) -> BrokerError {
    BrokerError::Transport(err.to_string())
}
