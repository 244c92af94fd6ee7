//! Partition store: per-tenant storage regions for delivered messages.
//!
//! The store is a behaviour contract so the Postgres backend and the
//! in-memory backend (dev/tests) are interchangeable. Partition provisioning
//! is not idempotent; the runtime controller is responsible for deduping.
use crate::cursor::InvalidCursor;
use crate::model::Message;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("partition already exists for tenant {0}")]
    AlreadyExists(Uuid),
    #[error("partition not found for tenant {0}")]
    NotFound(Uuid),
    #[error("no partition for tenant {0}")]
    PartitionMissing(Uuid),
    #[error("message {message_id} already exists for tenant {tenant_id}")]
    Conflict { tenant_id: Uuid, message_id: Uuid },
    #[error(transparent)]
    InvalidCursor(#[from] InvalidCursor),
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of a global scan in `(created_at, id)` ascending order.
///
/// `next_cursor` is `Some` iff the page was full, and then encodes the last
/// returned key.
#[derive(Debug)]
pub struct ScanPage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Provision an isolated storage region for a tenant. Not idempotent.
    async fn create_partition(&self, tenant_id: Uuid) -> StoreResult<()>;

    /// Remove a tenant's region and every message in it.
    async fn drop_partition(&self, tenant_id: Uuid) -> StoreResult<()>;

    /// Append a message to its tenant's partition.
    async fn insert(&self, message: &Message) -> StoreResult<()>;

    /// Read up to `limit` messages across all tenants, strictly after the
    /// decoded cursor (or from the beginning when the cursor is empty).
    async fn scan(&self, cursor: &str, limit: i64) -> StoreResult<ScanPage>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
