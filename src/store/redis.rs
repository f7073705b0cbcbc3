//! Redis adapter.
//!
//! Uses a [`ConnectionManager`], which reconnects with bounded retries and
//! applies a response timeout, so a slow or unreachable server surfaces as
//! [`StoreError::Unavailable`] instead of hanging the request.

use super::{check_ttl, Decrement, KvStore, StoreError, StoreResult};
use crate::config::StoreConfig;
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{IntoConnectionInfo, Script};
use std::time::Duration;
use tracing::info;

/// GET + DEL in one server-side step.
const TAKE_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
if value then
    redis.call('DEL', KEYS[1])
end
return value
"#;

/// DECR only while the counter is above zero. -1 when exhausted, -2 when
/// missing, -3 when the value is not an integer. DECR keeps the key's TTL;
/// reaching zero caps it at ARGV[1] milliseconds.
const DECREMENT_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return -2
end
local current = tonumber(raw)
if current == nil then
    return -3
end
if current <= 0 then
    return -1
end
local left = redis.call('DECR', KEYS[1])
if left == 0 then
    local cap = tonumber(ARGV[1])
    local ttl = redis.call('PTTL', KEYS[1])
    if ttl < 0 or ttl > cap then
        redis.call('PEXPIRE', KEYS[1], cap)
    end
end
return left
"#;

const SCAN_BATCH: usize = 200;

pub struct RedisStore {
    conn: ConnectionManager,
    take: Script,
    decrement: Script,
}

impl RedisStore {
    /// Connect using the address, credentials and database from `config`.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let mut info = format!("redis://{}", config.address).into_connection_info()?;
        info.redis.db = config.database;
        info.redis.username = config.username.clone();
        info.redis.password = config.password.clone();

        let client = redis::Client::open(info)?;
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.retries)
            .set_connection_timeout(config.timeout())
            .set_response_timeout(config.timeout());
        let conn = client
            .get_connection_manager_with_config(manager_config)
            .await?;

        info!(
            "Connected to Redis at {} (db {})",
            config.address, config.database
        );

        Ok(Self {
            conn,
            take: Script::new(TAKE_SCRIPT),
            decrement: Script::new(DECREMENT_SCRIPT),
        })
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let ttl_ms = check_ttl(ttl)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn put_all(&self, entries: &[(String, Vec<u8>)], ttl: Duration) -> StoreResult<()> {
        let ttl_ms = check_ttl(ttl)?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value.as_slice())
                .arg("PX")
                .arg(ttl_ms)
                .ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        value.ok_or(StoreError::NotFound)
    }

    async fn take(&self, key: &str) -> StoreResult<Vec<u8>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = self.take.key(key).invoke_async(&mut conn).await?;
        value.ok_or(StoreError::NotFound)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(())
    }

    async fn decrement_if_positive(
        &self,
        key: &str,
        exhausted_ttl: Duration,
    ) -> StoreResult<Decrement> {
        let cap_ms = check_ttl(exhausted_ttl)?;
        let mut conn = self.conn.clone();
        let value: i64 = self
            .decrement
            .key(key)
            .arg(cap_ms)
            .invoke_async(&mut conn)
            .await?;
        match value {
            -3 => Err(StoreError::InvalidArgument(format!(
                "value at {} is not a counter",
                key
            ))),
            -2 => Err(StoreError::NotFound),
            v if v < 0 => Ok(Decrement::Exhausted),
            v => Ok(Decrement::Decremented(v)),
        }
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
