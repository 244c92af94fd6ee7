use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// An isolated namespace owning one partition, one queue, and one consumer
/// pool. Immutable except for the pool's worker count, which lives on the
/// runtime controller's handle rather than here.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
}
