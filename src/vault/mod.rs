//! Secret lifecycle: creation, attempt-limited reveal, expiry and revocation.
//!
//! A secret is two store entries sharing one TTL:
//!
//! ```text
//! <prefix>:msg:<key>            -> SecretRecord JSON
//! <prefix>:msg:<key>:attempts   -> attempts remaining
//! ```
//!
//! Per-secret states are `Active`, then one of `Revealed`, `Locked` or
//! `Expired`. Every terminal state deletes both entries. The vault holds no
//! per-secret state itself; the store's conditional decrement and atomic take
//! serialize concurrent callers, across instances too.

pub mod cipher;
pub mod record;

pub use cipher::{CipherError, PayloadCipher};
pub use record::{SecretRecord, SecretSummary};

use crate::config::VaultConfig;
use crate::pin::{generate_key, is_well_formed_key, PinAlphabet, PinError, PinGenerator};
use crate::store::{Decrement, SharedStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const ATTEMPTS_SUFFIX: &str = ":attempts";

/// Vault errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("secret not found")]
    NotFound,

    #[error("secret locked")]
    Locked,

    #[error("wrong PIN")]
    WrongPin { remaining: Option<u32> },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("stored secret is corrupted: {0}")]
    Corrupted(String),
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
        }
    }
}

impl From<PinError> for VaultError {
    fn from(err: PinError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

/// What the creator gets back. The PIN is never shown again.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSecret {
    pub key: String,
    pub pin: String,
    pub expires_at: DateTime<Utc>,
}

/// Public limits clients need to build a create request
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VaultParams {
    pub pin_size: usize,
    pub pin_alphabet: &'static str,
    pub max_expire_secs: u64,
    pub max_pin_attempts: u32,
    pub max_payload_bytes: usize,
}

pub struct Vault {
    store: SharedStore,
    pins: PinGenerator,
    cipher: PayloadCipher,
    key_prefix: String,
    pin_size: usize,
    max_expire: Duration,
    max_pin_attempts: u32,
    max_payload_bytes: usize,
    disclose_attempts_remaining: bool,
    lockout_grace: Duration,
}

impl Vault {
    pub fn new(store: SharedStore, config: &VaultConfig, key_prefix: &str) -> Self {
        Self {
            store,
            pins: PinGenerator::new(config.pin_alphabet),
            cipher: PayloadCipher::new(&config.secret),
            key_prefix: key_prefix.to_string(),
            pin_size: config.pin_size,
            max_expire: config.max_expire(),
            max_pin_attempts: config.max_pin_attempts,
            max_payload_bytes: config.max_payload_bytes,
            disclose_attempts_remaining: config.disclose_attempts_remaining,
            lockout_grace: config.lockout_grace(),
        }
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}:msg:{}", self.key_prefix, key)
    }

    fn attempts_key(&self, key: &str) -> String {
        format!("{}:msg:{}{}", self.key_prefix, key, ATTEMPTS_SUFFIX)
    }

    fn both_keys(&self, key: &str) -> [String; 2] {
        [self.record_key(key), self.attempts_key(key)]
    }

    /// Store `payload` behind a fresh key and PIN.
    ///
    /// `max_attempts` defaults to the configured limit and may not exceed it.
    pub async fn create(
        &self,
        payload: &[u8],
        expire_after: Duration,
        max_attempts: Option<u32>,
    ) -> VaultResult<CreatedSecret> {
        if expire_after.as_millis() == 0 || expire_after > self.max_expire {
            return Err(VaultError::InvalidArgument(format!(
                "expiration must be between 1ms and {}s",
                self.max_expire.as_secs()
            )));
        }
        let max_attempts = max_attempts.unwrap_or(self.max_pin_attempts);
        if max_attempts == 0 || max_attempts > self.max_pin_attempts {
            return Err(VaultError::InvalidArgument(format!(
                "max attempts must be between 1 and {}",
                self.max_pin_attempts
            )));
        }
        if payload.is_empty() {
            return Err(VaultError::InvalidArgument("payload is empty".to_string()));
        }
        if payload.len() > self.max_payload_bytes {
            return Err(VaultError::InvalidArgument(format!(
                "payload exceeds {} bytes",
                self.max_payload_bytes
            )));
        }
        let lifetime = chrono::Duration::from_std(expire_after)
            .map_err(|e| VaultError::InvalidArgument(e.to_string()))?;

        let key = generate_key();
        let pin = self.pins.generate(self.pin_size)?;

        let sealed = self
            .cipher
            .seal(&key, payload)
            .map_err(|e| VaultError::Corrupted(e.to_string()))?;
        let created_at = Utc::now();
        let expires_at = created_at + lifetime;
        let record = SecretRecord::new(
            &sealed,
            self.cipher.pin_digest(&key, &pin),
            created_at,
            expires_at,
            max_attempts,
        );
        let record_bytes = record
            .to_bytes()
            .map_err(|e| VaultError::Corrupted(e.to_string()))?;

        // one transaction so a half-created secret is never visible
        self.store
            .put_all(
                &[
                    (self.record_key(&key), record_bytes),
                    (self.attempts_key(&key), max_attempts.to_string().into_bytes()),
                ],
                expire_after,
            )
            .await
            .inspect_err(|e| error!("Failed to store secret: {}", e))?;

        info!(
            "Secret {} created, expires at {}, {} attempts",
            short(&key),
            expires_at.to_rfc3339(),
            max_attempts
        );

        Ok(CreatedSecret {
            key,
            pin,
            expires_at,
        })
    }

    /// Return the payload if `pin` is right, consuming the secret.
    ///
    /// Each call spends one attempt before the PIN is compared, so the number
    /// of wrong guesses across all callers never exceeds the limit. A correct
    /// guess then takes the record atomically; of several concurrent correct
    /// guesses exactly one gets the payload.
    pub async fn reveal(&self, key: &str, pin: &str) -> VaultResult<Vec<u8>> {
        if !is_well_formed_key(key) {
            return Err(VaultError::NotFound);
        }

        let record = self.load(key).await?;
        if record.is_expired(Utc::now()) {
            debug!("Secret {} expired before store TTL fired", short(key));
            self.purge(key).await?;
            return Err(VaultError::NotFound);
        }

        let remaining = match self
            .store
            .decrement_if_positive(&self.attempts_key(key), self.lockout_grace)
            .await
        {
            Ok(Decrement::Decremented(remaining)) => remaining,
            // Another caller spent the last attempt and will either take the
            // record or lock it. Purging here could race its take. If that
            // caller never finishes, the counter expires after the lock-out
            // grace and the branch below cleans up.
            Ok(Decrement::Exhausted) => return Err(VaultError::NotFound),
            Err(StoreError::NotFound) => {
                // counter expired or deleted; drop the orphaned record
                self.purge(key).await?;
                return Err(VaultError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if self.cipher.verify_pin(key, pin, &record.pin_digest) {
            let raw = self.store.take(&self.record_key(key)).await?;
            if let Err(e) = self.store.delete(&[self.attempts_key(key)]).await {
                // the record is gone already; the counter expires on its own
                warn!("Failed to delete counter of revealed secret {}: {}", short(key), e);
            }
            let payload = self.open(key, &raw)?;
            info!("Secret {} revealed", short(key));
            return Ok(payload);
        }

        if remaining <= 0 {
            self.purge(key).await?;
            warn!("Secret {} locked after {} wrong PINs", short(key), record.max_attempts);
            return Err(VaultError::Locked);
        }

        debug!("Wrong PIN for secret {}, {} attempts left", short(key), remaining);
        Err(VaultError::WrongPin {
            remaining: self
                .disclose_attempts_remaining
                .then(|| u32::try_from(remaining).unwrap_or(0)),
        })
    }

    /// Remove a secret regardless of its state. Unknown keys are not an error.
    pub async fn delete(&self, key: &str) -> VaultResult<()> {
        if !is_well_formed_key(key) {
            return Ok(());
        }
        self.purge(key).await?;
        info!("Secret {} deleted", short(key));
        Ok(())
    }

    /// Metadata of every live secret, oldest first.
    pub async fn list(&self) -> VaultResult<Vec<SecretSummary>> {
        let prefix = format!("{}:msg:", self.key_prefix);
        let keys = self.store.scan(&prefix).await?;

        let mut summaries = Vec::new();
        for store_key in keys {
            let Some(key) = store_key.strip_prefix(&prefix) else {
                continue;
            };
            if key.ends_with(ATTEMPTS_SUFFIX) || !is_well_formed_key(key) {
                continue;
            }
            match self.describe(key).await {
                Ok(summary) => summaries.push(summary),
                // gone between scan and read
                Err(VaultError::NotFound) => {}
                Err(VaultError::Corrupted(e)) => {
                    warn!("Skipping corrupted secret {}: {}", short(key), e);
                }
                Err(e) => return Err(e),
            }
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(summaries)
    }

    /// Metadata of one secret. Secrets with no attempts left are already
    /// dead and read as not found.
    pub async fn describe(&self, key: &str) -> VaultResult<SecretSummary> {
        if !is_well_formed_key(key) {
            return Err(VaultError::NotFound);
        }
        let raw = self.store.get(&self.record_key(key)).await?;
        let record =
            SecretRecord::from_bytes(&raw).map_err(|e| VaultError::Corrupted(e.to_string()))?;
        if record.is_expired(Utc::now()) {
            return Err(VaultError::NotFound);
        }

        let attempts_remaining = match self.store.get(&self.attempts_key(key)).await {
            Ok(raw) => match crate::store::parse_counter(&raw) {
                Some(n) if n <= 0 => return Err(VaultError::NotFound),
                n => n.and_then(|n| u32::try_from(n).ok()),
            },
            Err(e) => return Err(e.into()),
        };

        Ok(SecretSummary {
            key: key.to_string(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            max_attempts: record.max_attempts,
            attempts_remaining,
        })
    }

    pub fn params(&self) -> VaultParams {
        VaultParams {
            pin_size: self.pin_size,
            pin_alphabet: match self.pins.alphabet() {
                PinAlphabet::Numeric => "numeric",
                PinAlphabet::Alphanumeric => "alphanumeric",
            },
            max_expire_secs: self.max_expire.as_secs(),
            max_pin_attempts: self.max_pin_attempts,
            max_payload_bytes: self.max_payload_bytes,
        }
    }

    /// Store reachability
    pub async fn ping(&self) -> VaultResult<()> {
        Ok(self.store.ping().await?)
    }

    async fn load(&self, key: &str) -> VaultResult<SecretRecord> {
        let raw = self.store.get(&self.record_key(key)).await?;
        match SecretRecord::from_bytes(&raw) {
            Ok(record) => Ok(record),
            Err(e) => {
                error!("Secret {} has an unreadable record, deleting: {}", short(key), e);
                self.purge(key).await?;
                Err(VaultError::Corrupted(e.to_string()))
            }
        }
    }

    fn open(&self, key: &str, raw: &[u8]) -> VaultResult<Vec<u8>> {
        let record =
            SecretRecord::from_bytes(raw).map_err(|e| VaultError::Corrupted(e.to_string()))?;
        let (nonce, ciphertext) = record
            .sealed_parts()
            .map_err(|e| VaultError::Corrupted(e.to_string()))?;
        self.cipher
            .open(key, &nonce, &ciphertext)
            .map_err(|e| VaultError::Corrupted(e.to_string()))
    }

    async fn purge(&self, key: &str) -> VaultResult<()> {
        Ok(self.store.delete(&self.both_keys(key)).await?)
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("key_prefix", &self.key_prefix)
            .field("pin_size", &self.pin_size)
            .field("max_expire", &self.max_expire)
            .field("max_pin_attempts", &self.max_pin_attempts)
            .finish_non_exhaustive()
    }
}

/// Key prefix safe to log
fn short(key: &str) -> &str {
    &key[..8.min(key.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, MemoryStore};
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    fn vault_with(config: VaultConfig) -> (Vault, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let vault = Vault::new(store.clone(), &config, "test");
        (vault, store)
    }

    fn test_config() -> VaultConfig {
        VaultConfig {
            secret: "test-secret".to_string(),
            ..VaultConfig::default()
        }
    }

    #[tokio::test]
    async fn test_create_validates_arguments() {
        let (vault, store) = vault_with(test_config());

        let too_long = Duration::from_secs(24 * 3600 + 1);
        for (payload, exp, attempts) in [
            (&b"x"[..], Duration::ZERO, None),
            (&b"x"[..], too_long, None),
            (&b"x"[..], HOUR, Some(0)),
            (&b"x"[..], HOUR, Some(4)),
            (&b""[..], HOUR, None),
        ] {
            assert!(matches!(
                vault.create(payload, exp, attempts).await,
                Err(VaultError::InvalidArgument(_))
            ));
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_payload_size_limit() {
        let (vault, _) = vault_with(VaultConfig {
            max_payload_bytes: 4,
            ..test_config()
        });
        assert!(vault.create(b"1234", HOUR, None).await.is_ok());
        assert!(matches!(
            vault.create(b"12345", HOUR, None).await,
            Err(VaultError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_create_writes_record_and_counter() {
        let (vault, store) = vault_with(test_config());
        let created = vault.create(b"hello", HOUR, Some(2)).await.unwrap();

        assert_eq!(created.pin.len(), 5);
        assert!(is_well_formed_key(&created.key));

        let raw = store.get(&format!("test:msg:{}", created.key)).await.unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(!text.contains("hello"));
        assert!(!text.contains(&created.pin));

        let counter = store
            .get(&format!("test:msg:{}:attempts", created.key))
            .await
            .unwrap();
        assert_eq!(counter, b"2");
    }

    #[tokio::test]
    async fn test_wrong_pin_without_disclosure() {
        let (vault, _) = vault_with(VaultConfig {
            disclose_attempts_remaining: false,
            ..test_config()
        });
        let created = vault.create(b"hello", HOUR, None).await.unwrap();
        assert_eq!(
            vault.reveal(&created.key, "wrong").await,
            Err(VaultError::WrongPin { remaining: None })
        );
    }

    #[tokio::test]
    async fn test_single_attempt_secret_locks_on_first_miss() {
        let (vault, store) = vault_with(test_config());
        let created = vault.create(b"hello", HOUR, Some(1)).await.unwrap();

        assert_eq!(vault.reveal(&created.key, "nope").await, Err(VaultError::Locked));
        assert!(store.is_empty());
        assert_eq!(
            vault.reveal(&created.key, &created.pin).await,
            Err(VaultError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_missing_counter_purges_record() {
        let (vault, store) = vault_with(test_config());
        let created = vault.create(b"hello", HOUR, None).await.unwrap();
        store
            .delete(&[format!("test:msg:{}:attempts", created.key)])
            .await
            .unwrap();

        assert_eq!(
            vault.reveal(&created.key, &created.pin).await,
            Err(VaultError::NotFound)
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_record_is_deleted() {
        let (vault, store) = vault_with(test_config());
        let key = generate_key();
        store
            .put(&format!("test:msg:{}", key), b"{not json", HOUR)
            .await
            .unwrap();

        assert!(matches!(
            vault.reveal(&key, "12345").await,
            Err(VaultError::Corrupted(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_key_never_reaches_store() {
        let (vault, _) = vault_with(test_config());
        assert_eq!(vault.reveal("*", "1").await, Err(VaultError::NotFound));
        assert_eq!(vault.describe("../x").await, Err(VaultError::NotFound));
        assert_eq!(vault.delete("*").await, Ok(()));
    }

    #[tokio::test]
    async fn test_list_and_describe() {
        let (vault, _) = vault_with(test_config());
        let first = vault.create(b"one", HOUR, None).await.unwrap();
        let second = vault.create(b"two", HOUR, Some(2)).await.unwrap();
        let _ = vault.reveal(&second.key, "wrong").await;

        let list = vault.list().await.unwrap();
        assert_eq!(list.len(), 2);

        let summary = vault.describe(&second.key).await.unwrap();
        assert_eq!(summary.max_attempts, 2);
        assert_eq!(summary.attempts_remaining, Some(1));

        vault.reveal(&first.key, &first.pin).await.unwrap();
        let list = vault.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].key, second.key);
    }

    /// Memory store whose next `delete` fails.
    #[derive(Default)]
    struct FlakyDeleteStore {
        inner: MemoryStore,
        fail_next_delete: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl KvStore for FlakyDeleteStore {
        async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> crate::store::StoreResult<()> {
            self.inner.put(key, value, ttl).await
        }

        async fn put_all(
            &self,
            entries: &[(String, Vec<u8>)],
            ttl: Duration,
        ) -> crate::store::StoreResult<()> {
            self.inner.put_all(entries, ttl).await
        }

        async fn get(&self, key: &str) -> crate::store::StoreResult<Vec<u8>> {
            self.inner.get(key).await
        }

        async fn take(&self, key: &str) -> crate::store::StoreResult<Vec<u8>> {
            self.inner.take(key).await
        }

        async fn delete(&self, keys: &[String]) -> crate::store::StoreResult<()> {
            if self
                .fail_next_delete
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.delete(keys).await
        }

        async fn decrement_if_positive(
            &self,
            key: &str,
            exhausted_ttl: Duration,
        ) -> crate::store::StoreResult<Decrement> {
            self.inner.decrement_if_positive(key, exhausted_ttl).await
        }

        async fn scan(&self, prefix: &str) -> crate::store::StoreResult<Vec<String>> {
            self.inner.scan(prefix).await
        }

        async fn ping(&self) -> crate::store::StoreResult<()> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn test_failed_lockout_purge_is_cleaned_up_later() {
        let store = Arc::new(FlakyDeleteStore::default());
        let vault = Vault::new(
            store.clone(),
            &VaultConfig {
                lockout_grace_ms: 50,
                ..test_config()
            },
            "test",
        );
        let created = vault.create(b"hello", HOUR, Some(1)).await.unwrap();

        store
            .fail_next_delete
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            vault.reveal(&created.key, "wrong").await,
            Err(VaultError::StoreUnavailable(_))
        ));

        // the leftover is dead to every reader
        assert_eq!(
            vault.reveal(&created.key, &created.pin).await,
            Err(VaultError::NotFound)
        );
        assert_eq!(vault.describe(&created.key).await, Err(VaultError::NotFound));
        assert!(vault.list().await.unwrap().is_empty());

        // once the exhausted counter lapses the next reveal deletes the record
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            vault.reveal(&created.key, &created.pin).await,
            Err(VaultError::NotFound)
        );
        assert!(store.inner.is_empty());
        assert!(store.inner.scan("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sub_millisecond_expiry_rejected_before_store() {
        let (vault, store) = vault_with(test_config());
        assert!(matches!(
            vault.create(b"x", Duration::from_micros(500), None).await,
            Err(VaultError::InvalidArgument(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_params() {
        let store = Arc::new(MemoryStore::new());
        let vault = Vault::new(store, &test_config(), "test");
        let params = vault.params();
        assert_eq!(params.pin_size, 5);
        assert_eq!(params.pin_alphabet, "numeric");
        assert_eq!(params.max_expire_secs, 86400);
        assert_eq!(params.max_pin_attempts, 3);
    }
}
