//! Publish/query service: the ingest path (store-then-publish) and the
//! paginated read path.
use crate::model::Message;
use crate::store::{MessageStore, ScanPage, StoreError};
use hive_broker::{Broker, BrokerError, Channel as _, tenant_queue_name};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("limit must be greater than zero")]
    InvalidLimit,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("broker publish failed: {0}")]
    Broker(#[from] BrokerError),
}

pub struct MessageService {
    broker: Arc<dyn Broker>,
    store: Arc<dyn MessageStore>,
}

impl MessageService {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn MessageStore>) -> Self {
        Self { broker, store }
    }

    /// Store first, then publish to the tenant's queue.
    ///
    /// If the publish fails the stored row remains; the consumer pool later
    /// persists the broker-delivered copy as a separate row with a fresh id.
    pub async fn publish(
        &self,
        tenant_id: Uuid,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ServiceError> {
        let body = serde_json::to_vec(payload).map_err(|_| ServiceError::InvalidPayload)?;
        let message = Message::new(tenant_id, body.clone());
        self.store.insert(&message).await?;

        let channel = self.broker.open_channel().await?;
        channel
            .publish(&tenant_queue_name(&tenant_id), &body)
            .await?;
        if let Err(err) = channel.close().await {
            tracing::debug!(error = %err, tenant_id = %tenant_id, "publish channel close failed");
        }
        Ok(())
    }

    /// Cursor-paginated read across all tenants.
    pub async fn fetch(&self, cursor: &str, limit: i64) -> Result<ScanPage, ServiceError> {
        if limit <= 0 {
            return Err(ServiceError::InvalidLimit);
        }
        Ok(self.store.scan(cursor, limit).await?)
    }
}
