//! Redis backend
//!
//! Batches run as one Lua script: all guards are checked first, then every
//! write and index update is applied. Redis executes scripts atomically, so
//! no other client observes a half-applied batch.

use async_trait::async_trait;
use portgate_common::{Error, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{Backend, WriteBatch};

const COMMIT_SCRIPT: &str = r#"
local batch = cjson.decode(ARGV[1])

for _, guard in ipairs(batch.guards) do
    local current = redis.call('GET', KEYS[guard[1]])
    local expected = guard[2]
    if expected == cjson.null then
        if current then
            return 0
        end
    elseif current ~= expected then
        return 0
    end
end

local change = 0
if batch.sequence ~= cjson.null then
    change = redis.call('INCR', KEYS[batch.sequence])
end

for _, write in ipairs(batch.writes) do
    if write[2] == cjson.null then
        redis.call('DEL', KEYS[write[1]])
    else
        redis.call('SET', KEYS[write[1]], write[2])
    end
end

for _, entry in ipairs(batch.index) do
    local score = entry[3]
    if score == cjson.null then
        score = change
    end
    redis.call('ZADD', KEYS[entry[1]], score, entry[2])
end

for _, entry in ipairs(batch.unindex) do
    redis.call('ZREM', KEYS[entry[1]], entry[2])
end

return 1
"#;

fn redis_error(err: RedisError) -> Error {
    Error::Redis(err.to_string())
}

/// Key list passed as KEYS; the payload refers to keys by 1-based position
#[derive(Default)]
struct KeyTable {
    keys: Vec<String>,
    positions: HashMap<String, usize>,
}

impl KeyTable {
    fn position(&mut self, key: &str) -> usize {
        if let Some(position) = self.positions.get(key) {
            return *position;
        }
        self.keys.push(key.to_string());
        let position = self.keys.len();
        self.positions.insert(key.to_string(), position);
        position
    }
}

/// Encode a batch as (KEYS, payload) for the commit script
fn encode(batch: &WriteBatch) -> (Vec<String>, String) {
    let mut table = KeyTable::default();

    let guards: Vec<Value> = batch
        .guards
        .iter()
        .map(|guard| json!([table.position(&guard.key), guard.expected]))
        .collect();
    let writes: Vec<Value> = batch
        .writes
        .iter()
        .map(|write| json!([table.position(&write.key), write.value]))
        .collect();
    let index: Vec<Value> = batch
        .index
        .iter()
        .map(|entry| json!([table.position(&entry.index), entry.member, entry.score]))
        .collect();
    let unindex: Vec<Value> = batch
        .unindex
        .iter()
        .map(|entry| json!([table.position(&entry.index), entry.member]))
        .collect();
    let sequence = batch
        .sequence
        .as_deref()
        .map(|sequence| table.position(sequence));

    let payload = json!({
        "guards": guards,
        "writes": writes,
        "index": index,
        "unindex": unindex,
        "sequence": sequence,
    });

    (table.keys, payload.to_string())
}

/// Redis-backed storage primitive
pub struct RedisBackend {
    conn: ConnectionManager,
    commit_script: Script,
}

impl RedisBackend {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            commit_script: Script::new(COMMIT_SCRIPT),
        })
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(redis_error)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn next_id(&self, sequence: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.incr(sequence, 1u64).await.map_err(redis_error)
    }

    async fn current_sequence(&self, sequence: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(sequence).await.map_err(redis_error)?;
        Ok(value.unwrap_or(0))
    }

    async fn index_range(&self, index: &str, after: Option<f64>) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        let min = match after {
            Some(score) => format!("({}", score),
            None => "-inf".to_string(),
        };
        conn.zrangebyscore_withscores(index, min, "+inf")
            .await
            .map_err(redis_error)
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<bool> {
        let (keys, payload) = encode(batch);

        let mut invocation = self.commit_script.prepare_invoke();
        for key in &keys {
            invocation.key(key);
        }
        invocation.arg(payload);

        let mut conn = self.conn.clone();
        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        debug!("Batch over {} keys applied: {}", keys.len(), applied == 1);
        Ok(applied == 1)
    }

    async fn put_expiring(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(redis_error)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(redis_error)
    }
}
