//! Key-value backends for the storage layer
//!
//! Records are JSON strings under plain keys; listings use sorted-set style
//! indexes (member + score). Every multi-record change goes through a
//! [`WriteBatch`]: the batch lists guarded keys with the value they must still
//! hold, and is applied all-or-nothing by the backend.

mod memory;
mod redis_store;

use async_trait::async_trait;
use portgate_common::Result;
use serde::Serialize;

pub use self::memory::MemoryBackend;
pub use self::redis_store::RedisBackend;

/// Storage primitive implemented by Redis and by the in-memory backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read one value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read many values, preserving order
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Allocate the next value of a sequence (starts at 1)
    async fn next_id(&self, sequence: &str) -> Result<u64>;

    /// Current value of a sequence without advancing it
    async fn current_sequence(&self, sequence: &str) -> Result<u64>;

    /// Index members with a score strictly greater than `after`, ascending
    async fn index_range(&self, index: &str, after: Option<f64>) -> Result<Vec<(String, f64)>>;

    /// Apply a batch atomically. Returns `false` when a guard did not hold,
    /// in which case nothing was written.
    async fn commit(&self, batch: &WriteBatch) -> Result<bool>;

    /// Store a value that disappears after `ttl_secs`
    async fn put_expiring(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

/// Guard: `key` must currently hold `expected` (`None` = absent)
#[derive(Debug, Clone)]
pub struct Guard {
    pub key: String,
    pub expected: Option<String>,
}

/// Write: set `key` to `value`, or delete it when `value` is `None`
#[derive(Debug, Clone)]
pub struct Write {
    pub key: String,
    pub value: Option<String>,
}

/// Index entry; a `None` score takes the batch's change sequence value
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub index: String,
    pub member: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct IndexRemoval {
    pub index: String,
    pub member: String,
}

/// All-or-nothing set of writes guarded by compare-and-set checks
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) guards: Vec<Guard>,
    pub(crate) writes: Vec<Write>,
    pub(crate) index: Vec<IndexEntry>,
    pub(crate) unindex: Vec<IndexRemoval>,
    pub(crate) sequence: Option<String>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to still hold `expected` at commit time
    pub fn guard(&mut self, key: impl Into<String>, expected: Option<&str>) -> &mut Self {
        self.guards.push(Guard {
            key: key.into(),
            expected: expected.map(str::to_string),
        });
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.writes.push(Write {
            key: key.into(),
            value: Some(value.into()),
        });
        self
    }

    pub fn put_json<T: Serialize>(&mut self, key: impl Into<String>, record: &T) -> Result<&mut Self> {
        let json = serde_json::to_string(record)?;
        Ok(self.put(key, json))
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.writes.push(Write {
            key: key.into(),
            value: None,
        });
        self
    }

    pub fn index(&mut self, index: impl Into<String>, member: impl ToString, score: f64) -> &mut Self {
        self.index.push(IndexEntry {
            index: index.into(),
            member: member.to_string(),
            score: Some(score),
        });
        self
    }

    /// Record `member` in a change feed, scored by the next value of `sequence`
    pub fn track_change(
        &mut self,
        sequence: impl Into<String>,
        index: impl Into<String>,
        member: impl ToString,
    ) -> &mut Self {
        self.sequence = Some(sequence.into());
        self.index.push(IndexEntry {
            index: index.into(),
            member: member.to_string(),
            score: None,
        });
        self
    }

    pub fn unindex(&mut self, index: impl Into<String>, member: impl ToString) -> &mut Self {
        self.unindex.push(IndexRemoval {
            index: index.into(),
            member: member.to_string(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_builder() {
        let mut batch = WriteBatch::new();

        batch
            .guard("slot:1", Some("{}"))
            .guard("container:1:open_ticket", None)
            .put("slot:1", "{\"state\":\"occupied\"}")
            .remove("container:2:open_ticket")
            .index("tickets:all", 7, 7.0)
            .track_change("seq:changes", "tickets:changes", 7);

        assert_eq!(batch.guards.len(), 2);
        assert_eq!(batch.guards[1].expected, None);
        assert_eq!(batch.writes.len(), 2);
        assert_eq!(batch.writes[1].value, None);
        assert_eq!(batch.index[1].score, None);
        assert_eq!(batch.sequence.as_deref(), Some("seq:changes"));
    }
}
