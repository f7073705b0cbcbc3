//! Lifecycle properties of the vault, driven over the memory store.
//!
//! The memory store gives the same per-key atomicity the Redis adapter gets
//! from the server, so these tests exercise the real reveal protocol.

use pinvault::config::VaultConfig;
use pinvault::store::{KvStore, MemoryStore};
use pinvault::vault::{Vault, VaultError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn new_vault() -> (Arc<Vault>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = VaultConfig {
        secret: "integration-secret".to_string(),
        ..VaultConfig::default()
    };
    (Arc::new(Vault::new(store.clone(), &config, "it")), store)
}

#[tokio::test]
async fn keys_are_non_empty_and_distinct() {
    let (vault, _) = new_vault();
    let mut keys = HashSet::new();
    for _ in 0..200 {
        let created = vault.create(b"payload", HOUR, None).await.unwrap();
        assert!(!created.key.is_empty());
        assert_ne!(created.key, created.pin);
        assert!(keys.insert(created.key));
    }
}

#[tokio::test]
async fn wrong_pins_then_lockout_scenario() {
    let (vault, store) = new_vault();
    let created = vault.create(b"hello", HOUR, Some(3)).await.unwrap();

    assert_eq!(
        vault.reveal(&created.key, "0000").await,
        Err(VaultError::WrongPin { remaining: Some(2) })
    );
    assert_eq!(
        vault.reveal(&created.key, "0000").await,
        Err(VaultError::WrongPin { remaining: Some(1) })
    );
    assert_eq!(
        vault.reveal(&created.key, "0000").await,
        Err(VaultError::Locked)
    );
    assert!(store.is_empty(), "locked secret must be deleted eagerly");

    assert_eq!(
        vault.reveal(&created.key, &created.pin).await,
        Err(VaultError::NotFound)
    );
}

#[tokio::test]
async fn correct_pin_reveals_exactly_once() {
    let (vault, store) = new_vault();
    let created = vault.create(b"hello", HOUR, None).await.unwrap();

    let payload = vault.reveal(&created.key, &created.pin).await.unwrap();
    assert_eq!(payload, b"hello");
    assert!(store.is_empty());

    assert_eq!(
        vault.reveal(&created.key, &created.pin).await,
        Err(VaultError::NotFound)
    );
}

#[tokio::test]
async fn correct_pin_after_some_misses_still_works() {
    let (vault, _) = new_vault();
    let created = vault.create(b"hello", HOUR, Some(3)).await.unwrap();

    assert!(matches!(
        vault.reveal(&created.key, "bad").await,
        Err(VaultError::WrongPin { .. })
    ));
    assert!(matches!(
        vault.reveal(&created.key, "bad").await,
        Err(VaultError::WrongPin { .. })
    ));
    assert_eq!(vault.reveal(&created.key, &created.pin).await.unwrap(), b"hello");
}

#[tokio::test]
async fn n_misses_lock_out_the_right_pin() {
    for attempts in 1..=3u32 {
        let (vault, _) = new_vault();
        let created = vault.create(b"hello", HOUR, Some(attempts)).await.unwrap();
        for _ in 0..attempts {
            assert!(vault.reveal(&created.key, "x").await.is_err());
        }
        let result = vault.reveal(&created.key, &created.pin).await;
        assert!(
            matches!(result, Err(VaultError::NotFound | VaultError::Locked)),
            "attempts={attempts}: {result:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_correct_reveals_succeed_once() {
    let (vault, _) = new_vault();
    let created = vault.create(b"hello", HOUR, Some(3)).await.unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let vault = Arc::clone(&vault);
            let key = created.key.clone();
            let pin = created.pin.clone();
            tokio::spawn(async move { vault.reveal(&key, &pin).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, VaultError::NotFound | VaultError::Locked)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wrong_guesses_never_exceed_limit() {
    let (vault, store) = new_vault();
    let created = vault.create(b"hello", HOUR, Some(3)).await.unwrap();

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let vault = Arc::clone(&vault);
            let key = created.key.clone();
            tokio::spawn(async move { vault.reveal(&key, &format!("guess-{i}")).await })
        })
        .collect();

    let mut mismatches = 0;
    for result in futures::future::join_all(tasks).await {
        match result.unwrap() {
            Err(VaultError::WrongPin { .. }) | Err(VaultError::Locked) => mismatches += 1,
            Err(VaultError::NotFound) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(mismatches, 3);
    assert!(store.is_empty());
}

#[tokio::test]
async fn expired_secret_is_not_found() {
    let (vault, _) = new_vault();
    let created = vault
        .create(b"hello", Duration::from_millis(50), None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        vault.reveal(&created.key, &created.pin).await,
        Err(VaultError::NotFound)
    );
}

#[tokio::test]
async fn delete_then_reveal_is_not_found() {
    let (vault, store) = new_vault();
    let created = vault.create(b"hello", HOUR, None).await.unwrap();

    vault.delete(&created.key).await.unwrap();
    assert!(store.is_empty());
    assert_eq!(
        vault.reveal(&created.key, &created.pin).await,
        Err(VaultError::NotFound)
    );

    // idempotent
    vault.delete(&created.key).await.unwrap();
}

#[tokio::test]
async fn unknown_key_is_not_found() {
    let (vault, store) = new_vault();
    let key = pinvault::pin::generate_key();
    assert_eq!(vault.reveal(&key, "12345").await, Err(VaultError::NotFound));
    assert!(store.scan("").await.unwrap().is_empty());
}
