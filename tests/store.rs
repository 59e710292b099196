// ABOUTME: Integration tests for the checkpoint stores.
// ABOUTME: File store persistence, expiry and atomic create, plus memory store parity.

mod support;

use std::sync::Arc;
use std::time::Duration;

use skyplan::store::{CheckpointStore, FileStore, MemoryStore, StoreErrorKind, keys};
use tempfile::TempDir;

const HOUR: Duration = Duration::from_secs(3600);

async fn file_store() -> (TempDir, FileStore) {
    support::init_tracing();
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path().join("state")).await.unwrap();
    (dir, store)
}

/// Behaviour every store must share.
async fn exercise(store: &dyn CheckpointStore) {
    let key = keys::context("d-1");
    assert_eq!(store.get(&key).await.unwrap(), None);

    store.put(&key, "first", HOUR).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("first"));

    store.put(&key, "second", HOUR).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("second"));

    assert!(!store.put_if_absent(&key, "third", HOUR).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("second"));

    store.delete(&key).await.unwrap();
    store.delete(&key).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), None);

    assert!(store.put_if_absent(&key, "fourth", HOUR).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("fourth"));
}

mod file {
    use super::*;

    /// Test: Put, overwrite, create-if-absent and delete on disk.
    #[tokio::test]
    async fn basic_operations() {
        let (_dir, store) = file_store().await;
        exercise(&store).await;
    }

    /// Test: Expired entries read as missing and can be recreated.
    #[tokio::test]
    async fn expired_entries_are_missing() {
        let (_dir, store) = file_store().await;
        let key = keys::lease("d-2");

        store.put(&key, "short", Duration::ZERO).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);

        store.put(&key, "short", Duration::ZERO).await.unwrap();
        assert!(store.put_if_absent(&key, "fresh", HOUR).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("fresh"));
    }

    /// Test: Entries survive reopening the same directory.
    #[tokio::test]
    async fn entries_persist_across_reopen() {
        let (dir, store) = file_store().await;
        let key = keys::checkpoint("d-3", 7);
        store.put(&key, r#"{"state":"approved"}"#, HOUR).await.unwrap();
        drop(store);

        let reopened = FileStore::open(dir.path().join("state")).await.unwrap();
        assert_eq!(
            reopened.get(&key).await.unwrap().as_deref(),
            Some(r#"{"state":"approved"}"#)
        );
    }

    /// Test: Keys that differ only in separators do not collide.
    #[tokio::test]
    async fn similar_keys_are_distinct() {
        let (_dir, store) = file_store().await;
        store.put("a:b", "colon", HOUR).await.unwrap();
        store.put("a_b", "underscore", HOUR).await.unwrap();
        store.put("a/b", "slash", HOUR).await.unwrap();

        assert_eq!(store.get("a:b").await.unwrap().as_deref(), Some("colon"));
        assert_eq!(store.get("a_b").await.unwrap().as_deref(), Some("underscore"));
        assert_eq!(store.get("a/b").await.unwrap().as_deref(), Some("slash"));
    }

    /// Test: A damaged file is reported as a corrupt entry.
    #[tokio::test]
    async fn garbage_on_disk_is_corrupt() {
        let (_dir, store) = file_store().await;
        store.put("broken", "value", HOUR).await.unwrap();
        std::fs::write(store.dir().join("broken.json"), b"not json").unwrap();

        let err = store.get("broken").await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Corrupt);
    }

    /// Test: Only one of many concurrent creators wins.
    #[tokio::test]
    async fn concurrent_put_if_absent_has_one_winner() {
        let (_dir, store) = file_store().await;
        let store = Arc::new(store);

        let attempts = (0..8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .put_if_absent(&keys::lease("race"), &format!("driver-{i}"), HOUR)
                    .await
                    .unwrap()
            })
        });
        let mut winners = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

mod memory {
    use super::*;

    /// Test: The memory store behaves like the file store.
    #[tokio::test]
    async fn basic_operations() {
        support::init_tracing();
        exercise(&MemoryStore::new()).await;
    }

    /// Test: Prefix listing skips expired entries.
    #[tokio::test]
    async fn prefix_listing_skips_expired() {
        let store = MemoryStore::new();
        store.put(&keys::checkpoint("d", 0), "a", HOUR).await.unwrap();
        store.put(&keys::checkpoint("d", 1), "b", HOUR).await.unwrap();
        store
            .put(&keys::checkpoint("d", 2), "c", Duration::ZERO)
            .await
            .unwrap();
        store.put(&keys::context("d"), "ctx", HOUR).await.unwrap();

        assert_eq!(
            store.keys_with_prefix("deployment:checkpoint:d:"),
            vec!["deployment:checkpoint:d:0", "deployment:checkpoint:d:1"]
        );
    }
}
