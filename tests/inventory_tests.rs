// Integration tests for the lock-protected inventory
//
// These tests verify:
// - Two exclusive opens: one wins, the other times out holding nothing
// - Precondition failures release the lock before the error escapes
// - Corrupt documents are fatal, not silently reseeded
// - Empty markers are written when the last host or group goes away

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use playrun::inventory::{InventoryError, InventoryStore, LockPolicy};

fn fast_policy() -> LockPolicy {
    LockPolicy {
        attempts: 3,
        retry_delay: Duration::from_millis(20),
    }
}

#[test]
fn test_seed_written_on_first_access() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory/hosts");
    let store = InventoryStore::new(&path, LockPolicy::default());

    let inventory = store.read().unwrap();
    assert!(inventory.groups().is_empty());
    assert!(inventory.hosts().is_empty());
    assert!(!inventory.is_locked());

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("all:"), "seed document: {raw}");
}

#[test]
fn test_concurrent_exclusive_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts");
    // separate stores behave like separate processes sharing the file
    let first = InventoryStore::new(&path, fast_policy());
    let second = InventoryStore::new(&path, fast_policy());

    let holder = first.lock().unwrap();
    assert!(holder.is_locked());

    let started = Instant::now();
    let contender = second.lock();
    assert!(matches!(
        contender,
        Err(InventoryError::LockTimeout { attempts: 3, .. })
    ));
    assert!(contender.unwrap_err().is_retryable());
    // bounded: attempts x delay plus slack, never unbounded blocking
    assert!(started.elapsed() < Duration::from_secs(2));

    drop(holder);
    let mut retry = second.lock().unwrap();
    retry.group_add("web").unwrap();
    assert!(!retry.is_locked());
    assert_eq!(first.read().unwrap().groups(), vec!["web"]);
}

#[test]
fn test_racing_writers_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts");
    let policy = LockPolicy {
        attempts: 50,
        retry_delay: Duration::from_millis(10),
    };
    InventoryStore::new(&path, policy).read().unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = InventoryStore::new(path, policy);
                barrier.wait();
                store.lock().unwrap().group_add(&format!("group{i}")).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let groups = InventoryStore::new(&path, policy).read().unwrap().groups();
    assert_eq!(groups, vec!["group0", "group1", "group2", "group3"]);
}

#[test]
fn test_precondition_failure_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let store = InventoryStore::new(dir.path().join("hosts"), fast_policy());
    store.lock().unwrap().group_add("web").unwrap();

    let mut handle = store.lock().unwrap();
    let err = handle.group_add("web").unwrap_err();
    assert!(matches!(err, InventoryError::GroupExists { .. }));
    assert!(!handle.is_locked());

    // still alive, yet another writer gets in immediately
    let mut other = store.lock().unwrap();
    assert!(matches!(
        other.host_remove("db", "h1"),
        Err(InventoryError::GroupMissing { .. })
    ));
    assert!(!other.is_locked());
    drop(handle);
}

#[test]
fn test_group_exists_leaves_document_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts");
    let store = InventoryStore::new(&path, LockPolicy::default());
    store.lock().unwrap().group_add("web").unwrap();
    store.lock().unwrap().host_add("web", "h1", Some(2222)).unwrap();

    let before = fs::read_to_string(&path).unwrap();
    assert!(store.lock().unwrap().group_add("web").is_err());
    assert_eq!(before, fs::read_to_string(&path).unwrap());
}

#[test]
fn test_host_removal_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = InventoryStore::new(dir.path().join("hosts"), LockPolicy::default());
    store.lock().unwrap().group_add("web").unwrap();

    assert!(matches!(
        store.lock().unwrap().host_remove("web", "h1"),
        Err(InventoryError::GroupEmpty { .. })
    ));
    store.lock().unwrap().host_add("web", "h1", None).unwrap();
    assert!(matches!(
        store.lock().unwrap().host_remove("web", "h2"),
        Err(InventoryError::HostMissing { .. })
    ));
    store.lock().unwrap().host_remove("web", "h1").unwrap();
    assert!(store.read().unwrap().hosts().is_empty());
}

#[test]
fn test_empty_markers_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts");
    let store = InventoryStore::new(&path, LockPolicy::default());
    store.lock().unwrap().group_add("web").unwrap();
    store.lock().unwrap().host_add("web", "h1", None).unwrap();
    store.lock().unwrap().host_remove("web", "h1").unwrap();

    let mut inventory = store.read().unwrap();
    assert_eq!(inventory.groups(), vec!["web"]);
    assert!(inventory.group_show("web").unwrap().is_empty());
    assert!(!inventory.document().group_has_hosts("web"));

    store.lock().unwrap().group_remove("web").unwrap();
    let inventory = store.read().unwrap();
    assert!(inventory.groups().is_empty());
    assert!(inventory.document().all.children.is_none());
}

#[test]
fn test_corrupt_document_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts");
    fs::write(&path, "all: [this is: not: an inventory").unwrap();
    let store = InventoryStore::new(&path, LockPolicy::default());

    let err = store.read().unwrap_err();
    assert!(matches!(err, InventoryError::Corrupt { .. }));
    assert!(err.is_fatal());
    assert!(!err.is_retryable());

    // the lock taken for the failed exclusive open is not leaked
    assert!(matches!(
        store.lock(),
        Err(InventoryError::Corrupt { .. })
    ));
    assert!(matches!(
        store.lock(),
        Err(InventoryError::Corrupt { .. })
    ));
    assert!(fs::read_to_string(&path).unwrap().starts_with("all: [this"));
}

#[test]
fn test_snapshot_cannot_save() {
    let dir = tempfile::tempdir().unwrap();
    let store = InventoryStore::new(dir.path().join("hosts"), LockPolicy::default());
    let mut snapshot = store.read().unwrap();
    assert!(matches!(
        snapshot.group_add("web"),
        Err(InventoryError::OperationNotAllowed)
    ));
    assert!(matches!(
        snapshot.save(),
        Err(InventoryError::OperationNotAllowed)
    ));
}
