//! Key-value store adapters.
//!
//! The vault keeps no secret state in process; every read and every attempt
//! counter lives in the store so that any number of stateless instances can
//! serve the same secrets. The operations the vault relies on for correctness
//! are single atomic calls against the store:
//!
//! - [`KvStore::decrement_if_positive`] arbitrates PIN attempts
//! - [`KvStore::take`] arbitrates the one successful reveal
//! - [`KvStore::put_all`] writes a record and its counter together
//!
//! Values are opaque bytes. Counters are stored as decimal strings so that the
//! Redis `DECR` family can operate on them directly.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::config::{StoreBackend, StoreConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Store adapter errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Uniform interface over a key-value store with per-key expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write `value` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Write every entry with the same `ttl`, all or nothing.
    async fn put_all(&self, entries: &[(String, Vec<u8>)], ttl: Duration) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Read and delete `key` in one step. Of several concurrent callers at
    /// most one receives the value.
    async fn take(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Remove keys. Absent keys are ignored.
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// Decrement the counter at `key` if it is above zero. A missing counter
    /// is `NotFound`. The decrement that reaches zero also shortens the
    /// counter's expiry to at most `exhausted_ttl`.
    async fn decrement_if_positive(
        &self,
        key: &str,
        exhausted_ttl: Duration,
    ) -> StoreResult<Decrement>;

    /// Keys starting with `prefix`.
    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Outcome of [`KvStore::decrement_if_positive`] on an existing counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// The counter was positive; this is its new value.
    Decremented(i64),
    /// The counter was already zero or below and was left alone.
    Exhausted,
}

pub type SharedStore = Arc<dyn KvStore>;

const EVICTION_PERIOD: Duration = Duration::from_secs(60);

/// Open the store selected by `config.backend`.
pub async fn connect(config: &StoreConfig) -> StoreResult<SharedStore> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(config).await?)),
        StoreBackend::Memory => {
            warn!("Using the in-process memory store; secrets are not shared between instances");
            let store = Arc::new(MemoryStore::new());
            MemoryStore::spawn_evictor(&store, EVICTION_PERIOD);
            Ok(store)
        }
    }
}

pub(crate) fn check_ttl(ttl: Duration) -> StoreResult<u64> {
    match u64::try_from(ttl.as_millis()) {
        Ok(0) => Err(StoreError::InvalidArgument("ttl must be positive".to_string())),
        Ok(ms) => Ok(ms),
        Err(_) => Err(StoreError::InvalidArgument("ttl out of range".to_string())),
    }
}

/// Parse a counter value written as a decimal string.
pub(crate) fn parse_counter(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}
