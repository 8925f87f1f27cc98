//! Dedup token store (SPEC_FULL §3 Dedup Token). `SET key val NX EX ttl` is
//! the sole correctness primitive — no in-process lock is involved.

use crate::errors::StreamError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const DEDUP_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct DedupStore {
    conn: ConnectionManager,
}

impl DedupStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Returns `true` if this event_id was newly reserved (not seen before),
    /// `false` if a dedup token already existed.
    pub async fn reserve(&self, event_id: &str) -> Result<bool, StreamError> {
        let mut conn = self.conn.clone();
        let key = format!("dedup:{event_id}");
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECONDS)
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    #[allow(dead_code)]
    pub async fn exists(&self, event_id: &str) -> Result<bool, StreamError> {
        let mut conn = self.conn.clone();
        let key = format!("dedup:{event_id}");
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }
}
