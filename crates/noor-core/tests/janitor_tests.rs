//! Integration tests for the storage janitor public interface.
//!
//! These run the janitor against real store backends and a store that fails
//! on chosen keys, checking the cleanup and quota guarantees end to end.

use chrono::{Duration, TimeZone, Utc};
use noor_core::janitor::keys::owned_key;
use noor_core::{
    IdentityHub, JanitorConfig, KeyValueStore, MemoryStore, NoorError, Result, SqliteStore,
    StorageJanitor, UserId,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Store wrapper that fails deletes (or reads) of selected keys.
struct FlakyStore {
    inner: MemoryStore,
    failing_deletes: HashSet<String>,
    failing_reads: HashSet<String>,
    mutations: Mutex<usize>,
}

impl FlakyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing_deletes: HashSet::new(),
            failing_reads: HashSet::new(),
            mutations: Mutex::new(0),
        }
    }

    fn fail_delete(mut self, key: &str) -> Self {
        self.failing_deletes.insert(key.to_string());
        self
    }

    fn fail_read(mut self, key: &str) -> Self {
        self.failing_reads.insert(key.to_string());
        self
    }

    fn mutations(&self) -> usize {
        *self.mutations.lock().unwrap()
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if self.failing_reads.contains(key) {
            return Err(NoorError::storage(key, "corrupt entry"));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        *self.mutations.lock().unwrap() += 1;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        *self.mutations.lock().unwrap() += 1;
        if self.failing_deletes.contains(key) {
            return Err(NoorError::storage(key, "delete rejected"));
        }
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}

/// Store whose key enumeration is unavailable.
struct UnavailableStore;

impl KeyValueStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(NoorError::StorageUnavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(NoorError::StorageUnavailable("storage disabled".into()))
    }

    fn delete(&self, _key: &str) -> Result<bool> {
        Err(NoorError::StorageUnavailable("storage disabled".into()))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Err(NoorError::StorageUnavailable("storage disabled".into()))
    }
}

fn hub(active: Option<&str>) -> Arc<IdentityHub> {
    Arc::new(IdentityHub::with_identity(
        active.map(|id| UserId::new(id).expect("valid user id")),
    ))
}

fn sample_store() -> MemoryStore {
    MemoryStore::with_entries([
        ("dhikr-session:u1:a", r#"{"count":33}"#),
        ("dhikr-session:u2:b", r#"{"count":99}"#),
        ("global:theme", "dark"),
    ])
}

#[test]
fn test_cleanup_for_user_deletes_exactly_that_users_entries() {
    let store = Arc::new(sample_store());
    let janitor = StorageJanitor::new(store.clone(), hub(Some("u2")), JanitorConfig::default());

    let result = janitor.cleanup_for_user("u1");

    assert_eq!(result.entries_deleted, 1);
    assert!(result.errors.is_empty());
    assert_eq!(
        store.keys().unwrap(),
        vec!["dhikr-session:u2:b", "global:theme"]
    );
}

#[test]
fn test_cleanup_for_empty_user_does_not_touch_store() {
    let store = Arc::new(FlakyStore::new(sample_store()));
    let janitor = StorageJanitor::new(store.clone(), hub(None), JanitorConfig::default());

    let result = janitor.cleanup_for_user("");

    assert_eq!(result.entries_deleted, 0);
    assert_eq!(result.entries_scanned, 0);
    assert_eq!(store.mutations(), 0);
    assert_eq!(store.keys().unwrap().len(), 3);
}

#[test]
fn test_full_cleanup_is_idempotent() {
    let store = Arc::new(MemoryStore::with_entries([
        ("dhikr-session:u1:a", r#"{"count":1}"#),
        ("dhikr-session:u9:z", r#"{"count":2}"#),
        ("session:current", "garbage"),
        ("global:cache", r#"{"expiresAt":"2000-01-01T00:00:00Z"}"#),
        ("global:theme", "dark"),
    ]));
    let janitor = StorageJanitor::new(store.clone(), hub(Some("u1")), JanitorConfig::default());

    let first = janitor.run_full_cleanup();
    let second = janitor.run_full_cleanup();

    assert_eq!(first.entries_deleted, 3);
    assert_eq!(second.entries_deleted, 0);
    assert_eq!(second.entries_scanned, 2);
    assert_eq!(
        store.keys().unwrap(),
        vec!["dhikr-session:u1:a", "global:theme"]
    );
}

#[test]
fn test_expired_session_markers_removed_regardless_of_owner() {
    let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
    let expired = format!(
        r#"{{"expiresAt":"{}"}}"#,
        (now - Duration::minutes(5)).to_rfc3339()
    );
    let valid = format!(
        r#"{{"expiresAt":{}}}"#,
        (now + Duration::hours(1)).timestamp_millis()
    );

    let store = Arc::new(MemoryStore::with_entries([
        ("dhikr-session:u1:old".to_string(), expired.clone()),
        ("dhikr-session:u1:live".to_string(), valid),
        ("session".to_string(), expired),
    ]));
    let janitor = StorageJanitor::new(store.clone(), hub(Some("u1")), JanitorConfig::default());

    let result = janitor.run_full_cleanup_at(now);

    assert_eq!(result.entries_deleted, 2);
    assert_eq!(store.keys().unwrap(), vec!["dhikr-session:u1:live"]);
}

#[test]
fn test_delete_failure_does_not_stop_remaining_deletions() {
    let store = Arc::new(
        FlakyStore::new(MemoryStore::with_entries([
            ("dhikr-session:u1:a", "{}"),
            ("dhikr-session:u1:b", "{}"),
            ("dhikr-session:u2:c", "{}"),
            ("global:theme", "dark"),
        ]))
        .fail_delete("dhikr-session:u1:b"),
    );
    let janitor = StorageJanitor::new(store.clone(), hub(None), JanitorConfig::default());

    let result = janitor.run_full_cleanup();

    assert_eq!(result.entries_deleted, 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].key, "dhikr-session:u1:b");
    assert!(result.errors[0].reason.contains("delete rejected"));
    assert_eq!(
        store.keys().unwrap(),
        vec!["dhikr-session:u1:b", "global:theme"]
    );
}

#[test]
fn test_unreadable_foreign_entry_is_still_reclaimed() {
    let store = Arc::new(FlakyStore::new(sample_store()).fail_read("dhikr-session:u2:b"));
    let janitor = StorageJanitor::new(store.clone(), hub(Some("u1")), JanitorConfig::default());

    let result = janitor.run_full_cleanup();

    assert_eq!(result.entries_deleted, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].key, "dhikr-session:u2:b");
    assert!(store.inner.get("dhikr-session:u2:b").unwrap().is_none());
}

#[test]
fn test_unavailable_store_reports_instead_of_failing() {
    let janitor = StorageJanitor::new(
        Arc::new(UnavailableStore),
        hub(Some("u1")),
        JanitorConfig::default(),
    );

    let full = janitor.run_full_cleanup();
    assert_eq!(full.entries_scanned, 0);
    assert_eq!(full.errors.len(), 1);
    assert_eq!(full.errors[0].key, "");

    let per_user = janitor.cleanup_for_user("u1");
    assert!(!per_user.is_clean());

    let quota = janitor.check_quota_usage();
    assert_eq!(quota.used_bytes, 0);
    assert!(!quota.is_near_limit);
    assert!(!quota.is_measured());
    assert!(quota
        .measurement_error
        .as_deref()
        .is_some_and(|reason| reason.contains("storage disabled")));
}

#[test]
fn test_store_failure_on_one_read_does_not_stop_cleanup() {
    struct BadSectorStore(MemoryStore);

    impl KeyValueStore for BadSectorStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            if key == "zz:last" {
                let err = std::io::Error::other("bad sector");
                return Err(NoorError::from(err));
            }
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.0.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<bool> {
            self.0.delete(key)
        }

        fn keys(&self) -> Result<Vec<String>> {
            self.0.keys()
        }
    }

    let store = Arc::new(BadSectorStore(MemoryStore::with_entries([
        ("dhikr-session:u2:b", r#"{"count":99}"#),
        ("global:theme", "dark"),
        ("zz:last", "?"),
    ])));
    let janitor = StorageJanitor::new(store.clone(), hub(Some("u1")), JanitorConfig::default());

    let result = janitor.run_full_cleanup();

    assert_eq!(result.entries_scanned, 3);
    assert_eq!(result.entries_deleted, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].key, "zz:last");
    assert_eq!(store.keys().unwrap(), vec!["global:theme", "zz:last"]);
}

#[test]
fn test_active_user_keys_survive_full_cleanup() {
    assert!(UserId::new("tenant:42").is_err());

    let active = UserId::new("tenant-42").unwrap();
    let own = owned_key("dhikr-progress", &active, "tasbih").unwrap();
    let store = Arc::new(MemoryStore::with_entries([
        (own.clone(), r#"{"count":33}"#.to_string()),
        ("dhikr-progress:tenant-7:tasbih".to_string(), "{}".to_string()),
    ]));
    let janitor = StorageJanitor::new(
        store.clone(),
        hub(Some("tenant-42")),
        JanitorConfig::default(),
    );

    let result = janitor.run_full_cleanup();

    assert_eq!(result.entries_deleted, 1);
    assert_eq!(store.keys().unwrap(), vec![own]);
}

#[test]
fn test_quota_check_is_a_pure_read() {
    let store = Arc::new(FlakyStore::new(sample_store()));
    let janitor = StorageJanitor::new(store.clone(), hub(None), JanitorConfig::default());
    let keys_before = store.keys().unwrap();

    for _ in 0..3 {
        janitor.check_quota_usage();
    }

    assert_eq!(store.keys().unwrap(), keys_before);
    assert_eq!(store.mutations(), 0);
}

#[test]
fn test_quota_scenarios_against_five_mib_ceiling() {
    const MIB: usize = 1024 * 1024;

    // One MiB including the key itself.
    let key = "global:quran-cache";
    let store = Arc::new(MemoryStore::with_entries([(
        key.to_string(),
        "x".repeat(MIB - key.len()),
    )]));
    let janitor = StorageJanitor::new(store.clone(), hub(None), JanitorConfig::default());

    let snapshot = janitor.check_quota_usage();
    assert_eq!(snapshot.used_bytes, MIB as u64);
    assert!(snapshot.is_measured());
    assert_eq!(snapshot.usage_percent, 20.0);
    assert!(!snapshot.is_near_limit);

    store
        .set("global:audio-index", &"y".repeat(3_300_000))
        .unwrap();
    let snapshot = janitor.check_quota_usage();
    // Past 4.1 MiB.
    assert!(snapshot.used_bytes > 4_299_162);
    assert!(snapshot.usage_percent > 80.0);
    assert!(snapshot.is_near_limit);
}

#[test]
fn test_sqlite_store_end_to_end() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("storage.sqlite")).unwrap());
    store.set("dhikr-session:u1:a", r#"{"count":1}"#).unwrap();
    store.set("dhikr-session:u2:b", r#"{"count":2}"#).unwrap();
    store.set("global:theme", "dark").unwrap();

    let hub = hub(Some("u1"));
    let janitor = StorageJanitor::new(store.clone(), hub.clone(), JanitorConfig::default());

    let result = janitor.run_full_cleanup();
    assert_eq!(result.entries_deleted, 1);
    assert_eq!(result.bytes_reclaimed, ("dhikr-session:u2:b".len() + 11) as u64);

    hub.set_identity(None);
    let result = janitor.cleanup_for_user("u1");
    assert_eq!(result.entries_deleted, 1);
    assert_eq!(store.keys().unwrap(), vec!["global:theme"]);
}
