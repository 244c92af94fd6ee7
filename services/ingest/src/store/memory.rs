//! In-memory partition store for development and tests.
//!
//! State is a map of tenant id to an ordered partition guarded by a
//! `tokio::sync::RwLock`. Not durable; single-process consistency only.
//! Scans merge across partitions to reproduce the global `(created_at, id)`
//! order the Postgres backend gets from its index.
use super::{MessageStore, ScanPage, StoreError, StoreResult};
use crate::cursor::{self, CursorKey};
use crate::model::Message;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Partition {
    // Ordered by scan key; `ids` enforces (tenant_id, id) uniqueness because
    // the scan key includes the timestamp.
    messages: BTreeMap<CursorKey, Message>,
    ids: HashSet<Uuid>,
}

#[derive(Default)]
pub struct InMemoryStore {
    partitions: Arc<RwLock<HashMap<Uuid, Partition>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn create_partition(&self, tenant_id: Uuid) -> StoreResult<()> {
        let mut partitions = self.partitions.write().await;
        if partitions.contains_key(&tenant_id) {
            return Err(StoreError::AlreadyExists(tenant_id));
        }
        partitions.insert(tenant_id, Partition::default());
        Ok(())
    }

    async fn drop_partition(&self, tenant_id: Uuid) -> StoreResult<()> {
        let mut partitions = self.partitions.write().await;
        partitions
            .remove(&tenant_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(tenant_id))
    }

    async fn insert(&self, message: &Message) -> StoreResult<()> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .get_mut(&message.tenant_id)
            .ok_or(StoreError::PartitionMissing(message.tenant_id))?;
        if !partition.ids.insert(message.id) {
            return Err(StoreError::Conflict {
                tenant_id: message.tenant_id,
                message_id: message.id,
            });
        }
        let key = CursorKey {
            created_at: message.created_at,
            id: message.id,
        };
        partition.messages.insert(key, message.clone());
        Ok(())
    }

    async fn scan(&self, cursor: &str, limit: i64) -> StoreResult<ScanPage> {
        let after = cursor::decode(cursor)?;
        let partitions = self.partitions.read().await;

        let mut merged: BTreeMap<CursorKey, Message> = BTreeMap::new();
        for partition in partitions.values() {
            for (key, message) in &partition.messages {
                if let Some(after) = &after {
                    if key <= after {
                        continue;
                    }
                }
                merged.insert(*key, message.clone());
            }
        }

        let messages: Vec<Message> = merged.into_values().take(limit as usize).collect();
        let next_cursor = (messages.len() as i64 == limit)
            .then(|| messages.last())
            .flatten()
            .map(|last| {
                cursor::encode(&CursorKey {
                    created_at: last.created_at,
                    id: last.id,
                })
            });
        Ok(ScanPage {
            messages,
            next_cursor,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn message(tenant_id: Uuid, offset_ms: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            tenant_id,
            payload: br#"{"k":"v"}"#.to_vec(),
            created_at: Utc::now() + Duration::milliseconds(offset_ms),
        }
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        store.create_partition(tenant).await.unwrap();
        assert!(matches!(
            store.create_partition(tenant).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn drop_absent_partition_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.drop_partition(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn insert_requires_partition() {
        let store = InMemoryStore::new();
        let err = store.insert(&message(Uuid::new_v4(), 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::PartitionMissing(_)));
    }

    #[tokio::test]
    async fn duplicate_message_id_conflicts() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        store.create_partition(tenant).await.unwrap();
        let msg = message(tenant, 0);
        store.insert(&msg).await.unwrap();
        let mut dup = message(tenant, 1);
        dup.id = msg.id;
        assert!(matches!(
            store.insert(&dup).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn drop_removes_all_messages() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        store.create_partition(tenant).await.unwrap();
        store.insert(&message(tenant, 0)).await.unwrap();
        store.drop_partition(tenant).await.unwrap();

        let page = store.scan("", 10).await.unwrap();
        assert!(page.messages.is_empty());
    }

    #[tokio::test]
    async fn scan_pages_in_key_order_across_tenants() {
        let store = InMemoryStore::new();
        let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
        store.create_partition(t1).await.unwrap();
        store.create_partition(t2).await.unwrap();
        for offset in 0..7 {
            let tenant = if offset % 2 == 0 { t1 } else { t2 };
            store.insert(&message(tenant, offset)).await.unwrap();
        }

        let first = store.scan("", 3).await.unwrap();
        assert_eq!(first.messages.len(), 3);
        let second = store
            .scan(first.next_cursor.as_deref().unwrap(), 3)
            .await
            .unwrap();
        assert_eq!(second.messages.len(), 3);
        let third = store
            .scan(second.next_cursor.as_deref().unwrap(), 3)
            .await
            .unwrap();
        assert_eq!(third.messages.len(), 1);
        assert!(third.next_cursor.is_none());

        // Strictly increasing keys across page boundaries.
        let mut all = first.messages;
        all.extend(second.messages);
        all.extend(third.messages);
        let keys: Vec<(chrono::DateTime<Utc>, Uuid)> =
            all.iter().map(|m| (m.created_at, m.id)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn scan_rejects_malformed_cursor() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.scan("not-base64!!", 5).await,
            Err(StoreError::InvalidCursor(_))
        ));
    }
}
