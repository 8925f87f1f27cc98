//! Durable stream client (SPEC_FULL §4.D). Thin typed wrapper over Redis
//! Streams: append, group-read, ack, pending-range, auto-claim, trim.
//! No in-process lock — correctness lives in the external store.

use crate::errors::StreamError;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::collections::HashMap;

#[derive(Clone)]
pub struct StreamClient {
    conn: ConnectionManager,
}

/// One entry read back from the stream: its id plus the raw field map.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, FieldValue>,
}

/// A stream field's value, preserving whether it arrived as a string so the
/// consumer can distinguish "missing" from "present but not a string"
/// (SPEC_FULL §4.E `invalid_data_type` vs `missing_data_field`).
#[derive(Debug, Clone)]
pub enum FieldValue {
    Str(String),
    Other,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Other => None,
        }
    }
}

/// Per-entry delivery metadata from `XPENDING`.
#[derive(Debug, Clone)]
pub struct PendingInfo {
    pub id: String,
    pub consumer: String,
    pub idle_ms: i64,
    pub delivery_count: i64,
}

impl StreamClient {
    pub async fn connect(addr: &str, password: Option<&str>) -> Result<Self, StreamError> {
        let url = match password {
            Some(pw) => format!("redis://:{pw}@{addr}"),
            None => format!("redis://{addr}"),
        };
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Creates the consumer group if it does not already exist, tolerating
    /// the `BUSYGROUP` error the same way the upstream ingest/consumer
    /// binaries do.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let res: RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match res {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends a `{data: <json>}` entry, optionally trimming approximately
    /// to `max_len` immediately after.
    pub async fn append(&self, stream: &str, data: &str, max_len: Option<u64>) -> Result<String, StreamError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream);
        if let Some(len) = max_len {
            cmd.arg("MAXLEN").arg("~").arg(len);
        }
        cmd.arg("*").arg("data").arg(data);
        let id: String = cmd.query_async(&mut conn).await?;
        Ok(id)
    }

    /// Blocking group read of up to `count` new entries (`>`).
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamReadReply = conn
            .xread_options(
                &[stream],
                &[">"],
                &redis::streams::StreamReadOptions::default()
                    .group(group, consumer)
                    .count(count)
                    .block(block_ms),
            )
            .await?;
        Ok(flatten_reply(reply))
    }

    pub async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await?;
        Ok(())
    }

    /// Inspects delivery counts for in-flight entries without claiming them.
    pub async fn pending_range(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingInfo>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamPendingCountReply = conn
            .xpending_count(stream, group, "-", "+", count)
            .await?;
        Ok(reply
            .ids
            .into_iter()
            .map(|p| PendingInfo {
                id: p.id,
                consumer: p.consumer,
                idle_ms: p.last_delivered_ms as i64,
                delivery_count: p.times_delivered as i64,
            })
            .collect())
    }

    /// Claims entries idle longer than `min_idle_ms`, advancing from `cursor`.
    /// Returns the reclaimed entries and the next cursor to resume from.
    pub async fn auto_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: usize,
        cursor: &str,
        count: usize,
    ) -> Result<(String, Vec<StreamEntry>), StreamError> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamAutoClaimReply = conn
            .xautoclaim_options(
                stream,
                group,
                consumer,
                min_idle_ms,
                cursor,
                redis::streams::StreamAutoClaimOptions::default().count(count),
            )
            .await?;
        let entries = reply
            .claimed
            .into_iter()
            .map(|id_map| StreamEntry {
                id: id_map.id,
                fields: map_from_kv(id_map.map),
            })
            .collect();
        Ok((reply.cursor, entries))
    }

    /// Deletes entries older than `cutoff_ms` (id-time < cutoff). Idempotent.
    pub async fn trim_before(&self, stream: &str, cutoff_ms: i64) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let min_id = format!("{cutoff_ms}-0");
        let _: i64 = redis::cmd("XTRIM")
            .arg(stream)
            .arg("MINID")
            .arg(min_id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn stream_len(&self, stream: &str) -> Result<u64, StreamError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(stream).await?;
        Ok(len)
    }

    pub async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, StreamError> {
        let mut conn = self.conn.clone();
        let summary: redis::streams::StreamPendingReply = conn.xpending(stream, group).await?;
        Ok(match summary {
            redis::streams::StreamPendingReply::Data(d) => d.count as u64,
            redis::streams::StreamPendingReply::Empty => 0,
        })
    }

    /// Delivery metadata for exactly one entry, via a single-id `XPENDING`
    /// range. Returns `None` if the entry has no pending record (already
    /// acknowledged or never delivered through this group).
    pub async fn pending_for(&self, stream: &str, group: &str, id: &str) -> Result<Option<PendingInfo>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamPendingCountReply = conn.xpending_count(stream, group, id, id, 1).await?;
        Ok(reply.ids.into_iter().next().map(|p| PendingInfo {
            id: p.id,
            consumer: p.consumer,
            idle_ms: p.last_delivered_ms as i64,
            delivery_count: p.times_delivered as i64,
        }))
    }

    /// Single round-trip liveness probe for the pre-flight dependency check
    /// (SPEC_FULL §5, single 2-second deadline, no retries).
    pub async fn ping(&self) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Newest-first read of up to `count` entries, independent of any
    /// consumer group. Used by the evidence pipeline to source recent DLQ
    /// entries as envelope artifacts — a plain history read, not a
    /// delivery-tracked one.
    pub async fn recent_entries(&self, stream: &str, count: usize) -> Result<Vec<StreamEntry>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: Vec<(String, Vec<(String, redis::Value)>)> = redis::cmd("XREVRANGE")
            .arg(stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(reply
            .into_iter()
            .map(|(id, kv)| StreamEntry { id, fields: map_from_kv(kv) })
            .collect())
    }
}

fn map_from_kv(kv: impl IntoIterator<Item = (String, redis::Value)>) -> HashMap<String, FieldValue> {
    kv.into_iter()
        .map(|(k, v)| {
            let value = match v {
                redis::Value::BulkString(b) => FieldValue::Str(String::from_utf8_lossy(&b).to_string()),
                redis::Value::SimpleString(s) => FieldValue::Str(s),
                _ => FieldValue::Other,
            };
            (k, value)
        })
        .collect()
}

fn flatten_reply(reply: redis::streams::StreamReadReply) -> Vec<StreamEntry> {
    let mut out = Vec::new();
    for key in reply.keys {
        for id_entry in key.ids {
            out.push(StreamEntry {
                id: id_entry.id,
                fields: map_from_kv(id_entry.map),
            });
        }
    }
    out
}
