//! Postgres-backed partition store.
//!
//! The logical schema is a single `messages` table partitioned by
//! `LIST (tenant_id)`; each tenant gets a physically independent partition so
//! dropping a tenant is a table drop, not a scan. Partition names are derived
//! deterministically from the tenant id, so provisioning and reclamation need
//! no name mapping.
//!
//! Partition DDL cannot use bind parameters, so the partition name goes
//! through an identifier-quoting primitive and the tenant id is embedded as a
//! literal only after it has parsed as a [`Uuid`].
//!
//! Migrations are embedded and run at startup, before the API serves; pool
//! acquisition is bounded so an unhealthy database fails fast instead of
//! hanging requests.
use super::{MessageStore, ScanPage, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::cursor::{self, CursorKey};
use crate::model::Message;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
const SQLSTATE_CHECK_VIOLATION: &str = "23514";
const SQLSTATE_DUPLICATE_TABLE: &str = "42P07";
const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";

pub struct PostgresStore {
    pool: PgPool,
}

/// Row shape for the `messages` table. Payload comes back as text so the
/// store hands raw bytes to callers without re-encoding.
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    id: Uuid,
    tenant_id: Uuid,
    payload: String,
    created_at: DateTime<Utc>,
}

impl PostgresStore {
    /// Connect, bound the pool, and run embedded migrations before serving.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let connect_options =
            PgConnectOptions::from_str(&config.url).map_err(|e| StoreError::Unavailable(e.into()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::Unavailable(e.into()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.into()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn create_partition(&self, tenant_id: Uuid) -> StoreResult<()> {
        // DDL takes no bind parameters: quoted identifier + UUID literal.
        let query = format!(
            "CREATE TABLE {} PARTITION OF messages FOR VALUES IN ('{tenant_id}')",
            quote_ident(&partition_name(tenant_id)),
        );
        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(err) if sqlstate_is(&err, SQLSTATE_DUPLICATE_TABLE) => {
                Err(StoreError::AlreadyExists(tenant_id))
            }
            Err(err) => Err(StoreError::Unavailable(err.into())),
        }
    }

    async fn drop_partition(&self, tenant_id: Uuid) -> StoreResult<()> {
        let query = format!("DROP TABLE {}", quote_ident(&partition_name(tenant_id)));
        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(err) if sqlstate_is(&err, SQLSTATE_UNDEFINED_TABLE) => {
                Err(StoreError::NotFound(tenant_id))
            }
            Err(err) => Err(StoreError::Unavailable(err.into())),
        }
    }

    async fn insert(&self, message: &Message) -> StoreResult<()> {
        let payload = std::str::from_utf8(&message.payload)
            .map_err(|_| StoreError::Unavailable(anyhow!("payload is not valid utf-8")))?;
        let result = sqlx::query(
            r#"INSERT INTO messages (id, tenant_id, payload, created_at)
               VALUES ($1, $2, $3::jsonb, $4)"#,
        )
        .bind(message.id)
        .bind(message.tenant_id)
        .bind(payload)
        .bind(message.created_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if sqlstate_is(&err, SQLSTATE_UNIQUE_VIOLATION) => Err(StoreError::Conflict {
                tenant_id: message.tenant_id,
                message_id: message.id,
            }),
            // Routing a row with no matching partition is a check violation.
            Err(err) if sqlstate_is(&err, SQLSTATE_CHECK_VIOLATION) => {
                Err(StoreError::PartitionMissing(message.tenant_id))
            }
            Err(err) => Err(StoreError::Unavailable(err.into())),
        }
    }

    async fn scan(&self, cursor: &str, limit: i64) -> StoreResult<ScanPage> {
        let after = cursor::decode(cursor)?;
        let rows: Vec<DbMessage> = match after {
            Some(key) => {
                sqlx::query_as(
                    r#"SELECT id, tenant_id, payload::text AS payload, created_at
                       FROM messages
                       WHERE (created_at, id) > ($1, $2)
                       ORDER BY created_at, id
                       LIMIT $3"#,
                )
                .bind(key.created_at)
                .bind(key.id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"SELECT id, tenant_id, payload::text AS payload, created_at
                       FROM messages
                       ORDER BY created_at, id
                       LIMIT $1"#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StoreError::Unavailable(e.into()))?;

        let messages: Vec<Message> = rows
            .into_iter()
            .map(|row| Message {
                id: row.id,
                tenant_id: row.tenant_id,
                payload: row.payload.into_bytes(),
                created_at: row.created_at,
            })
            .collect();
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
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.into()))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn partition_name(tenant_id: Uuid) -> String {
    format!("messages_tenant_{}", tenant_id.to_string().replace('-', "_"))
}

// Double embedded quotes; every dynamically named identifier goes through
// here before entering a statement.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sqlstate_is(err: &sqlx::Error, code: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|c| c == code).unwrap_or(false);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_names_are_deterministic() {
        let id = Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap();
        assert_eq!(
            partition_name(id),
            "messages_tenant_11111111_2222_3333_4444_555555555555"
        );
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
