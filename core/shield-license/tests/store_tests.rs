use shield_license::{CredentialStore, FileStore, LicenseError, MemoryStore};

// ── MemoryStore ──────────────────────────────────────────────────

#[test]
fn memory_store_set_get_delete() {
    let store = MemoryStore::new();
    assert!(store.get("k").unwrap().is_none());
    store.set("k", b"v1").unwrap();
    store.set("k", b"v2").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v2"[..]));
    assert_eq!(store.len(), 1);
    store.delete("k").unwrap();
    store.delete("k").unwrap();
    assert!(store.is_empty());
}

#[test]
fn memory_store_write_failures() {
    let store = MemoryStore::new();
    store.set("k", b"v").unwrap();
    store.set_fail_writes(true);
    assert!(matches!(store.set("k", b"x"), Err(LicenseError::Storage(_))));
    assert!(matches!(store.delete("k"), Err(LicenseError::Storage(_))));
    assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    store.set_fail_writes(false);
    store.set("k", b"x").unwrap();
}

// ── FileStore ────────────────────────────────────────────────────

#[test]
fn file_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("credentials.json");

    let store = FileStore::new(&path);
    store.set("shield_device_id", b"device-1").unwrap();
    store.set("shield_license_key", &[0xff, 0x00, 0x7f]).unwrap();
    drop(store);

    let reopened = FileStore::new(&path);
    assert_eq!(reopened.path(), path.as_path());
    assert_eq!(
        reopened.get("shield_device_id").unwrap().as_deref(),
        Some(&b"device-1"[..])
    );
    assert_eq!(
        reopened.get("shield_license_key").unwrap(),
        Some(vec![0xff, 0x00, 0x7f])
    );
}

#[test]
fn file_store_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("absent.json"));
    assert!(store.get("anything").unwrap().is_none());
    store.delete("anything").unwrap();
}

#[test]
fn file_store_delete_removes_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("c.json"));
    store.set("a", b"1").unwrap();
    store.set("b", b"2").unwrap();
    store.delete("a").unwrap();
    assert!(store.get("a").unwrap().is_none());
    assert!(store.get("b").unwrap().is_some());
}

#[test]
fn file_store_corrupt_file_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    std::fs::write(&path, "{ not json").unwrap();
    let store = FileStore::new(&path);
    assert!(matches!(store.get("a"), Err(LicenseError::Storage(_))));
}

#[test]
fn file_store_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    let store = FileStore::new(&path);
    store.set("a", b"1").unwrap();
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}
