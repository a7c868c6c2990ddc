//! Durable key-value storage for the license record.
//!
//! Platform keychains plug in through [`CredentialStore`]. Two reference
//! adapters are provided: an in-process map and a single JSON file.

use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Durable key-value store, encrypted at rest by the platform.
///
/// Implementations need not be transactional across keys; the state
/// machine serializes every read-modify-write sequence itself.
pub trait CredentialStore: Send + Sync {
    /// Reads a value, `None` if the key is absent.
    fn get(&self, key: &str) -> LicenseResult<Option<Vec<u8>>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &[u8]) -> LicenseResult<()>;

    /// Removes a key. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> LicenseResult<()>;
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set`/`delete` fail (storage fault injection).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> LicenseResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LicenseError::Storage("store is read-only".into()));
        }
        Ok(())
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> LicenseResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> LicenseResult<()> {
        self.check_writable()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> LicenseResult<()> {
        self.check_writable()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON file of base64 values.
///
/// Every write rewrites the whole file through a temp file and a rename,
/// so a crash never leaves a half-written map behind. Protection at rest is
/// whatever the file system gives the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens (or lazily creates) the store at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default location: `<data_local_dir>/shield/credentials.json`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the platform has no local data directory.
    pub fn default_path() -> LicenseResult<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join("shield").join("credentials.json"))
            .ok_or_else(|| LicenseError::Storage("no local data directory".into()))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> LicenseResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                LicenseError::Storage(format!("corrupt store {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(LicenseError::Storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> LicenseResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LicenseError::Storage(format!("cannot create {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| LicenseError::Storage(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            LicenseError::Storage(format!("cannot replace {}: {e}", self.path.display()))
        })
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> LicenseResult<Option<Vec<u8>>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let map = self.read_map()?;
        match map.get(key) {
            Some(encoded) => BASE64
                .decode(encoded)
                .map(Some)
                .map_err(|e| LicenseError::Storage(format!("corrupt value for {key}: {e}"))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> LicenseResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        map.insert(key.to_string(), BASE64.encode(value));
        self.write_map(&map)
    }

    fn delete(&self, key: &str) -> LicenseResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
