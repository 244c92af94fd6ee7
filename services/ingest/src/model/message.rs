use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A persisted message. Payload bytes are opaque: expected to be JSON but
/// never parsed by the store.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a fresh record for raw payload bytes, stamped now.
    pub fn new(tenant_id: Uuid, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            payload,
            created_at: Utc::now(),
        }
    }
}
