//! Process-local store with TTL, for development and tests.
//!
//! Each operation runs under the shard lock of the entry it touches, which
//! gives the same per-key atomicity the Redis adapter gets from the server.
//! It is not shared between instances, so it only suits single-node setups.

use super::{check_ttl, parse_counter, Decrement, KvStore, StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Evict expired entries every `period` until the store is dropped.
    pub fn spawn_evictor(store: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.evict_expired();
            }
        })
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|r| !r.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        check_ttl(ttl)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn put_all(&self, entries: &[(String, Vec<u8>)], ttl: Duration) -> StoreResult<()> {
        check_ttl(ttl)?;
        let expires_at = Instant::now() + ttl;
        for (key, value) in entries {
            self.entries.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return Err(StoreError::NotFound),
        };
        // the read guard is released before removing
        match value {
            Some(value) => Ok(value),
            None => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                Err(StoreError::NotFound)
            }
        }
    }

    async fn take(&self, key: &str) -> StoreResult<Vec<u8>> {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(now) => Ok(entry.value),
            _ => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn decrement_if_positive(
        &self,
        key: &str,
        exhausted_ttl: Duration,
    ) -> StoreResult<Decrement> {
        check_ttl(exhausted_ttl)?;
        let now = Instant::now();
        let mut entry = self.entries.get_mut(key).ok_or(StoreError::NotFound)?;
        if entry.is_expired(now) {
            return Err(StoreError::NotFound);
        }
        match parse_counter(&entry.value) {
            Some(current) if current > 0 => {
                let next = current - 1;
                entry.value = next.to_string().into_bytes();
                if next == 0 {
                    entry.expires_at = entry.expires_at.min(now + exhausted_ttl);
                }
                Ok(Decrement::Decremented(next))
            }
            Some(_) => Ok(Decrement::Exhausted),
            None => Err(StoreError::InvalidArgument(format!(
                "value at {} is not a counter",
                key
            ))),
        }
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|r| r.key().starts_with(prefix) && !r.value().is_expired(now))
            .map(|r| r.key().clone())
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
