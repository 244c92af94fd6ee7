//! Opaque pagination cursor.
//!
//! A cursor encodes the `(created_at, id)` ordering key of the last returned
//! message as `base64( RFC3339-with-nanoseconds "|" uuid )`. The empty string
//! means "from the beginning". Decoding an issued cursor always yields a key
//! strictly less than every key on the next page.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Total order for pagination: lexicographic on `(created_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CursorKey {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

#[derive(thiserror::Error, Debug)]
#[error("invalid cursor: {0}")]
pub struct InvalidCursor(&'static str);

pub fn encode(key: &CursorKey) -> String {
    let raw = format!(
        "{}|{}",
        key.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        key.id
    );
    BASE64.encode(raw)
}

/// Decode a cursor string. `Ok(None)` means "scan from the beginning".
pub fn decode(cursor: &str) -> Result<Option<CursorKey>, InvalidCursor> {
    if cursor.is_empty() {
        return Ok(None);
    }
    let decoded = BASE64
        .decode(cursor)
        .map_err(|_| InvalidCursor("not base64 encoded"))?;
    let decoded = String::from_utf8(decoded).map_err(|_| InvalidCursor("not valid utf-8"))?;
    let (timestamp, id) = decoded
        .split_once('|')
        .ok_or(InvalidCursor("malformed structure"))?;
    let created_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| InvalidCursor("could not parse time"))?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(id).map_err(|_| InvalidCursor("could not parse id"))?;
    Ok(Some(CursorKey { created_at, id }))
}
