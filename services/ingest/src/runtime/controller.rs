//! Tenant runtime controller.
//!
//! # Purpose
//! Owns the registry of live tenants and orchestrates the three-way resource
//! lifecycle (partition + queue + consumer pool) behind a single
//! reader-writer lock. The registry is the only source of truth for which
//! tenants are live in this process.
//!
//! # Key invariants
//! - Every mutation (`create_tenant`, `delete_tenant`, `update_concurrency`,
//!   `shutdown_consumers`) holds the exclusive lock for its whole sequence,
//!   so a tenant id never maps to more than one handle.
//! - A handle's recorded worker count always matches the pool it spawned and
//!   is greater than zero.
//!
//! # Failure semantics
//! Provisioning is ordered partition → queue → pool with no compensating
//! undo: a failure after the partition step leaves the partition behind, and
//! the returned error names the failing step so an operator can reclaim it.
//! A pool that dies (broker transport failure) is not restarted; the remedy
//! is `update_concurrency` or delete + create.
use crate::runtime::consumer::{self, PoolSpec};
use crate::store::{MessageStore, StoreError};
use hive_broker::{Broker, BrokerError, Channel as _, tenant_queue_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("tenant not found")]
    TenantNotFound,
    #[error("tenant already exists")]
    TenantExists,
    #[error("workers must be greater than zero")]
    InvalidWorkerCount,
    #[error("partition provisioning failed: {0}")]
    Partition(#[source] StoreError),
    #[error("queue provisioning failed: {0}")]
    Queue(#[source] BrokerError),
    #[error("queue teardown failed: {0}")]
    QueueTeardown(#[source] BrokerError),
    #[error("partition teardown failed: {0}")]
    PartitionTeardown(#[source] StoreError),
}

// Controller-side record of one live pool. The join handle doubles as the
// pool's completion signal during shutdown.
struct ConsumerHandle {
    workers: usize,
    cancel: CancellationToken,
    done: JoinHandle<()>,
}

pub struct TenantRuntime {
    consumers: RwLock<HashMap<Uuid, ConsumerHandle>>,
    broker: Arc<dyn Broker>,
    store: Arc<dyn MessageStore>,
    default_workers: usize,
}

impl TenantRuntime {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn MessageStore>, default_workers: usize) -> Self {
        Self {
            consumers: RwLock::new(HashMap::new()),
            broker,
            store,
            default_workers,
        }
    }

    /// Provision a tenant: partition, then queue, then consumer pool.
    ///
    /// Each failure aborts the remaining steps and surfaces as the variant
    /// naming the failing step. Earlier steps are not undone.
    pub async fn create_tenant(&self, tenant_id: Uuid, name: &str) -> Result<(), RuntimeError> {
        let mut consumers = self.consumers.write().await;
        if consumers.contains_key(&tenant_id) {
            return Err(RuntimeError::TenantExists);
        }

        self.store
            .create_partition(tenant_id)
            .await
            .map_err(RuntimeError::Partition)?;

        let queue = tenant_queue_name(&tenant_id);
        let channel = self
            .broker
            .open_channel()
            .await
            .map_err(RuntimeError::Queue)?;
        channel
            .declare_queue(&queue)
            .await
            .map_err(RuntimeError::Queue)?;
        if let Err(err) = channel.close().await {
            tracing::debug!(error = %err, tenant_id = %tenant_id, "channel close failed");
        }

        let handle = self.spawn_pool(tenant_id, queue, self.default_workers);
        consumers.insert(tenant_id, handle);
        metrics::gauge!("ingest_live_tenants").increment(1.0);
        tracing::info!(tenant_id = %tenant_id, name, "tenant created and consumer pool started");
        Ok(())
    }

    /// Tear a tenant down: cancel the pool, delete the queue, drop the
    /// registry entry, drop the partition.
    ///
    /// Cancellation is asynchronous; this does not wait for the pool to
    /// drain.
    pub async fn delete_tenant(&self, tenant_id: Uuid) -> Result<(), RuntimeError> {
        let mut consumers = self.consumers.write().await;
        let handle = consumers
            .get(&tenant_id)
            .ok_or(RuntimeError::TenantNotFound)?;
        handle.cancel.cancel();

        let channel = self
            .broker
            .open_channel()
            .await
            .map_err(RuntimeError::QueueTeardown)?;
        channel
            .delete_queue(&tenant_queue_name(&tenant_id))
            .await
            .map_err(RuntimeError::QueueTeardown)?;
        if let Err(err) = channel.close().await {
            tracing::debug!(error = %err, tenant_id = %tenant_id, "channel close failed");
        }

        consumers.remove(&tenant_id);
        metrics::gauge!("ingest_live_tenants").decrement(1.0);

        self.store
            .drop_partition(tenant_id)
            .await
            .map_err(RuntimeError::PartitionTeardown)?;
        tracing::info!(tenant_id = %tenant_id, "tenant consumer stopped, queue and partition dropped");
        Ok(())
    }

    /// Re-concurrency by pool replacement: cancel the old pool and start a
    /// fresh one with the new worker count on the same queue.
    ///
    /// The old pool may still be draining while the new one consumes; the
    /// broker splits deliveries between them and both write to the same
    /// partition with fresh message ids, so the overlap is benign.
    pub async fn update_concurrency(
        &self,
        tenant_id: Uuid,
        workers: usize,
    ) -> Result<(), RuntimeError> {
        if workers == 0 {
            return Err(RuntimeError::InvalidWorkerCount);
        }
        let mut consumers = self.consumers.write().await;
        let Some(old) = consumers.remove(&tenant_id) else {
            return Err(RuntimeError::TenantNotFound);
        };
        old.cancel.cancel();
        tracing::info!(tenant_id = %tenant_id, workers, "restarting consumer pool with new concurrency");

        let handle = self.spawn_pool(tenant_id, tenant_queue_name(&tenant_id), workers);
        consumers.insert(tenant_id, handle);
        Ok(())
    }

    /// Recorded worker count for a live tenant.
    pub async fn worker_count(&self, tenant_id: Uuid) -> Option<usize> {
        self.consumers
            .read()
            .await
            .get(&tenant_id)
            .map(|handle| handle.workers)
    }

    /// Cancel every pool and wait for them to drain, up to `deadline`.
    ///
    /// Registry entries are left in place; the process is terminating. Pools
    /// still running at the deadline are abandoned and torn down by
    /// connection close on exit.
    pub async fn shutdown_consumers(&self, deadline: Duration) {
        let mut consumers = self.consumers.write().await;
        tracing::info!(tenants = consumers.len(), "shutting down all consumer pools");
        for handle in consumers.values() {
            handle.cancel.cancel();
        }
        let drains = consumers.values_mut().map(|handle| &mut handle.done);
        match tokio::time::timeout(deadline, futures_util::future::join_all(drains)).await {
            Ok(_) => tracing::info!("all consumer pools drained"),
            Err(_) => {
                tracing::warn!("shutdown deadline expired before all pools drained");
            }
        }
    }

    fn spawn_pool(&self, tenant_id: Uuid, queue: String, workers: usize) -> ConsumerHandle {
        let cancel = CancellationToken::new();
        let done = tokio::spawn(consumer::run_pool(
            Arc::clone(&self.broker),
            Arc::clone(&self.store),
            PoolSpec {
                tenant_id,
                queue,
                workers,
                cancel: cancel.clone(),
            },
        ));
        ConsumerHandle {
            workers,
            cancel,
            done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;
    use crate::store::memory::InMemoryStore;
    use hive_broker::{Channel as _, MemoryBroker};

    fn runtime_with_workers(workers: usize) -> (Arc<TenantRuntime>, Arc<dyn Broker>, Arc<dyn MessageStore>) {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
        let runtime = Arc::new(TenantRuntime::new(
            Arc::clone(&broker),
            Arc::clone(&store),
            workers,
        ));
        (runtime, broker, store)
    }

    async fn wait_for<F, Fut>(mut probe: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if probe().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn create_provisions_partition_queue_and_pool() {
        let (runtime, broker, store) = runtime_with_workers(1);
        let tenant = Uuid::new_v4();
        runtime.create_tenant(tenant, "acme").await.unwrap();

        // Partition accepts inserts and the queue accepts publishes.
        store.insert(&Message::new(tenant, b"{}".to_vec())).await.unwrap();
        let channel = broker.open_channel().await.unwrap();
        channel
            .publish(&tenant_queue_name(&tenant), br#"{"k":"v"}"#)
            .await
            .unwrap();
        assert_eq!(runtime.worker_count(tenant).await, Some(1));
    }

    #[tokio::test]
    async fn create_twice_is_rejected() {
        let (runtime, _broker, _store) = runtime_with_workers(1);
        let tenant = Uuid::new_v4();
        runtime.create_tenant(tenant, "one").await.unwrap();
        assert!(matches!(
            runtime.create_tenant(tenant, "two").await,
            Err(RuntimeError::TenantExists)
        ));
    }

    #[tokio::test]
    async fn pool_persists_published_deliveries() {
        let (runtime, broker, store) = runtime_with_workers(2);
        let tenant = Uuid::new_v4();
        runtime.create_tenant(tenant, "acme").await.unwrap();

        let channel = broker.open_channel().await.unwrap();
        let queue = tenant_queue_name(&tenant);
        for _ in 0..5 {
            channel.publish(&queue, br#"{"n":1}"#).await.unwrap();
        }

        wait_for(|| {
            let store = Arc::clone(&store);
            async move { store.scan("", 10).await.unwrap().messages.len() == 5 }
        })
        .await;
    }

    #[tokio::test]
    async fn delete_reclaims_partition_and_queue() {
        let (runtime, broker, store) = runtime_with_workers(1);
        let tenant = Uuid::new_v4();
        runtime.create_tenant(tenant, "acme").await.unwrap();
        runtime.delete_tenant(tenant).await.unwrap();

        let err = store
            .insert(&Message::new(tenant, b"{}".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PartitionMissing(_)));

        let channel = broker.open_channel().await.unwrap();
        assert!(
            channel
                .publish(&tenant_queue_name(&tenant), b"{}")
                .await
                .is_err()
        );
        assert!(runtime.worker_count(tenant).await.is_none());
    }

    #[tokio::test]
    async fn delete_unknown_tenant_is_not_found() {
        let (runtime, _broker, _store) = runtime_with_workers(1);
        assert!(matches!(
            runtime.delete_tenant(Uuid::new_v4()).await,
            Err(RuntimeError::TenantNotFound)
        ));
    }

    #[tokio::test]
    async fn update_concurrency_replaces_the_pool() {
        let (runtime, broker, store) = runtime_with_workers(1);
        let tenant = Uuid::new_v4();
        runtime.create_tenant(tenant, "acme").await.unwrap();

        let channel = broker.open_channel().await.unwrap();
        let queue = tenant_queue_name(&tenant);
        for _ in 0..10 {
            channel.publish(&queue, br#"{"phase":1}"#).await.unwrap();
        }
        // Let the first pool finish its backlog before replacing it; a
        // cancelled pool drops whatever is still in its job buffer.
        wait_for(|| {
            let store = Arc::clone(&store);
            async move { store.scan("", 50).await.unwrap().messages.len() == 10 }
        })
        .await;

        runtime.update_concurrency(tenant, 8).await.unwrap();
        assert_eq!(runtime.worker_count(tenant).await, Some(8));

        for _ in 0..10 {
            channel.publish(&queue, br#"{"phase":2}"#).await.unwrap();
        }

        // Every delivery from both phases lands exactly once.
        wait_for(|| {
            let store = Arc::clone(&store);
            async move { store.scan("", 50).await.unwrap().messages.len() == 20 }
        })
        .await;
    }

    #[tokio::test]
    async fn update_concurrency_validates_input() {
        let (runtime, _broker, _store) = runtime_with_workers(1);
        let tenant = Uuid::new_v4();
        runtime.create_tenant(tenant, "acme").await.unwrap();
        assert!(matches!(
            runtime.update_concurrency(tenant, 0).await,
            Err(RuntimeError::InvalidWorkerCount)
        ));
        assert!(matches!(
            runtime.update_concurrency(Uuid::new_v4(), 2).await,
            Err(RuntimeError::TenantNotFound)
        ));
    }

    #[tokio::test]
    async fn shutdown_returns_within_deadline_and_stops_inserts() {
        let (runtime, broker, store) = runtime_with_workers(4);
        for index in 0..3 {
            runtime
                .create_tenant(Uuid::new_v4(), &format!("tenant-{index}"))
                .await
                .unwrap();
        }

        let started = std::time::Instant::now();
        runtime.shutdown_consumers(Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(5));

        // Post-shutdown publishes are never persisted.
        let before = store.scan("", 100).await.unwrap().messages.len();
        let channel = broker.open_channel().await.unwrap();
        // Queues still exist (shutdown is not deletion), but no pool consumes.
        for (tenant, _) in runtime.consumers.read().await.iter() {
            channel
                .publish(&tenant_queue_name(tenant), b"{}")
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after = store.scan("", 100).await.unwrap().messages.len();
        assert_eq!(before, after);
    }
}
