//! In-memory backend for development and tests
//!
//! Same semantics as the Redis backend: a batch is checked and applied
//! under one lock, so it is atomic with respect to every other operation.

use async_trait::async_trait;
use portgate_common::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Backend, WriteBatch};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Tables {
    values: HashMap<String, Entry>,
    indexes: HashMap<String, HashMap<String, f64>>,
    sequences: HashMap<String, u64>,
}

impl Tables {
    /// Live value of `key`. An expired entry is dropped on the way.
    fn value(&mut self, key: &str) -> Option<&str> {
        let now = Instant::now();
        if self
            .values
            .get(key)
            .is_some_and(|entry| !entry.is_live(now))
        {
            self.values.remove(key);
        }
        self.values.get(key).map(|entry| entry.value.as_str())
    }

    fn sweep_expired(&mut self) {
        let now = Instant::now();
        self.values.retain(|_, entry| entry.is_live(now));
    }

    fn incr(&mut self, sequence: &str) -> u64 {
        let next = self.sequences.entry(sequence.to_string()).or_insert(0);
        *next += 1;
        *next
    }
}

/// Mutex-guarded maps standing in for Redis
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.value(key).map(str::to_string))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut tables = self.tables.lock().await;
        Ok(keys
            .iter()
            .map(|key| tables.value(key).map(str::to_string))
            .collect())
    }

    async fn next_id(&self, sequence: &str) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        Ok(tables.incr(sequence))
    }

    async fn current_sequence(&self, sequence: &str) -> Result<u64> {
        let tables = self.tables.lock().await;
        Ok(tables.sequences.get(sequence).copied().unwrap_or(0))
    }

    async fn index_range(&self, index: &str, after: Option<f64>) -> Result<Vec<(String, f64)>> {
        let tables = self.tables.lock().await;
        let mut members: Vec<(String, f64)> = tables
            .indexes
            .get(index)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, score)| after.map_or(true, |min| **score > min))
                    .map(|(member, score)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default();

        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<bool> {
        let mut tables = self.tables.lock().await;

        for guard in &batch.guards {
            if tables.value(&guard.key) != guard.expected.as_deref() {
                debug!("Guard failed on key: {}", guard.key);
                return Ok(false);
            }
        }

        let change = batch
            .sequence
            .as_deref()
            .map(|sequence| tables.incr(sequence) as f64)
            .unwrap_or(0.0);

        for write in &batch.writes {
            match &write.value {
                Some(value) => {
                    tables.values.insert(
                        write.key.clone(),
                        Entry {
                            value: value.clone(),
                            expires_at: None,
                        },
                    );
                }
                None => {
                    tables.values.remove(&write.key);
                }
            }
        }

        for entry in &batch.index {
            tables
                .indexes
                .entry(entry.index.clone())
                .or_default()
                .insert(entry.member.clone(), entry.score.unwrap_or(change));
        }

        for removal in &batch.unindex {
            if let Some(entries) = tables.indexes.get_mut(&removal.index) {
                entries.remove(&removal.member);
            }
        }

        Ok(true)
    }

    async fn put_expiring(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.sweep_expired();
        tables.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.values.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_commit_applies_all_or_nothing() {
        let backend = MemoryBackend::new();

        let mut create = WriteBatch::new();
        create
            .guard("slot:1", None)
            .put("slot:1", "empty")
            .index("slots:all", 1, 1.0);
        assert!(backend.commit(&create).await.unwrap());

        // stale expectation: nothing is written
        let mut stale = WriteBatch::new();
        stale
            .guard("slot:1", Some("occupied"))
            .put("slot:1", "empty-again")
            .put("ticket:1", "{}");
        assert!(!backend.commit(&stale).await.unwrap());
        assert_eq!(backend.get("slot:1").await.unwrap().as_deref(), Some("empty"));
        assert_eq!(backend.get("ticket:1").await.unwrap(), None);

        let mut occupy = WriteBatch::new();
        occupy
            .guard("slot:1", Some("empty"))
            .put("slot:1", "occupied")
            .remove("missing");
        assert!(backend.commit(&occupy).await.unwrap());
        assert_eq!(
            backend.get("slot:1").await.unwrap().as_deref(),
            Some("occupied")
        );
    }

    #[tokio::test]
    async fn test_change_feed_scores_follow_sequence() {
        let backend = MemoryBackend::new();

        for member in ["7", "8", "7"] {
            let mut batch = WriteBatch::new();
            batch.track_change("seq:changes", "tickets:changes", member);
            assert!(backend.commit(&batch).await.unwrap());
        }

        assert_eq!(backend.current_sequence("seq:changes").await.unwrap(), 3);

        let all = backend.index_range("tickets:changes", None).await.unwrap();
        assert_eq!(all, vec![("8".to_string(), 2.0), ("7".to_string(), 3.0)]);

        let after = backend
            .index_range("tickets:changes", Some(2.0))
            .await
            .unwrap();
        assert_eq!(after, vec![("7".to_string(), 3.0)]);
    }

    #[tokio::test]
    async fn test_sequences_and_unindex() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.next_id("seq:tickets").await.unwrap(), 1);
        assert_eq!(backend.next_id("seq:tickets").await.unwrap(), 2);
        assert_eq!(backend.next_id("seq:users").await.unwrap(), 1);

        let mut batch = WriteBatch::new();
        batch.index("zone:1:slots", 3, 3.0).index("zone:1:slots", 4, 4.0);
        backend.commit(&batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.unindex("zone:1:slots", 3);
        backend.commit(&batch).await.unwrap();

        let members = backend.index_range("zone:1:slots", None).await.unwrap();
        assert_eq!(members, vec![("4".to_string(), 4.0)]);
    }

    #[tokio::test]
    async fn test_expiring_values() {
        let backend = MemoryBackend::new();
        backend.put_expiring("session:a", "x", 60).await.unwrap();
        assert_eq!(backend.get("session:a").await.unwrap().as_deref(), Some("x"));

        backend.put_expiring("session:b", "y", 0).await.unwrap();
        assert_eq!(backend.get("session:b").await.unwrap(), None);

        backend.delete("session:a").await.unwrap();
        assert_eq!(backend.get("session:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_values_are_dropped() {
        let backend = MemoryBackend::new();
        backend.put_expiring("session:live", "x", 60).await.unwrap();
        for i in 0..1000 {
            backend
                .put_expiring(&format!("session:{}", i), "y", 0)
                .await
                .unwrap();
        }
        // each put sweeps what expired before it
        assert_eq!(backend.tables.lock().await.values.len(), 2);

        assert_eq!(backend.get("session:999").await.unwrap(), None);
        assert_eq!(backend.tables.lock().await.values.len(), 1);

        backend.put_expiring("session:last", "z", 0).await.unwrap();
        let values = backend
            .get_many(&["session:last".to_string(), "session:live".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![None, Some("x".to_string())]);
        assert_eq!(backend.tables.lock().await.values.len(), 1);
    }
}
