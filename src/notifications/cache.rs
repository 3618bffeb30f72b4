//! Durable local cache for the notification list.
//!
//! The whole list lives under one key as a JSON array and is rewritten on
//! every mutation. A second key records which user the list belongs to;
//! [`NotificationCache::claim`] drops a list owned by someone else. Write
//! failures are logged by the store and never fatal: the in-memory list
//! stays authoritative for the session.
//!
//! # Storage structure
//!
//! ```text
//! ~/.config/boardsync/
//!     cache/
//!         notifications.json          # NotificationRecord[]
//!         notifications-owner.json    # owning user id
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::merge;
use super::record::NotificationRecord;
use crate::constants;

/// Local cache read/write failure.
#[derive(Debug)]
pub enum PersistenceError {
    /// Filesystem failure.
    Io(std::io::Error),
    /// The list could not be encoded or the stored value could not be decoded.
    Serialize(serde_json::Error),
    /// The backing store refused the write.
    Unavailable(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Cache I/O error: {e}"),
            Self::Serialize(e) => write!(f, "Cache serialization error: {e}"),
            Self::Unavailable(msg) => write!(f, "Cache unavailable: {msg}"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Serialize(e) => Some(e),
            Self::Unavailable(_) => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

/// Minimal durable key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    /// Replaces the value stored under `key`.
    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    /// Deletes `key`. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store under `{config_dir}/cache`.
    pub fn in_config_dir() -> anyhow::Result<Self> {
        let dir = crate::config::Config::config_dir()?.join("cache");
        Ok(Self::open(dir)?)
    }

    /// Directory holding the key files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        // Write-then-rename; readers never see a partial list.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and embedders without a filesystem.
///
/// Writes can be made to fail to exercise the persistence error path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `put`/`remove` calls fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(PersistenceError::Unavailable("writes disabled".to_string()));
        }
        inner.values.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(PersistenceError::Unavailable("writes disabled".to_string()));
        }
        inner.values.remove(key);
        inner.writes += 1;
        Ok(())
    }
}

/// Typed view of the notification list inside a [`KeyValueStore`].
#[derive(Clone)]
pub struct NotificationCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for NotificationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCache").finish_non_exhaustive()
    }
}

impl NotificationCache {
    /// Wraps a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads the cached list, newest-first with duplicate ids removed.
    pub fn load(&self) -> Result<Vec<NotificationRecord>, PersistenceError> {
        let Some(raw) = self.store.get(constants::NOTIFICATIONS_CACHE_KEY)? else {
            return Ok(Vec::new());
        };
        let records: Vec<NotificationRecord> = serde_json::from_str(&raw)?;
        Ok(merge::normalize(records))
    }

    /// Rewrites the whole cached list.
    pub fn save(&self, records: &[NotificationRecord]) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(records)?;
        self.store.put(constants::NOTIFICATIONS_CACHE_KEY, &raw)
    }

    /// Drops the cached list and its owner.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.store.remove(constants::NOTIFICATIONS_CACHE_KEY)?;
        self.store.remove(constants::NOTIFICATIONS_OWNER_KEY)
    }

    /// User the cached list belongs to, if recorded.
    pub fn owner(&self) -> Result<Option<u64>, PersistenceError> {
        Ok(self
            .store
            .get(constants::NOTIFICATIONS_OWNER_KEY)?
            .and_then(|raw| raw.trim().parse().ok()))
    }

    /// Binds the cache to `user_id`.
    ///
    /// A list recorded for another user is removed first. A list with no
    /// recorded owner is adopted. Returns `true` when a list was removed.
    pub fn claim(&self, user_id: u64) -> Result<bool, PersistenceError> {
        let owner = self.owner()?;
        if owner == Some(user_id) {
            return Ok(false);
        }
        let foreign = owner.is_some();
        if foreign {
            self.store.remove(constants::NOTIFICATIONS_CACHE_KEY)?;
        }
        self.store
            .put(constants::NOTIFICATIONS_OWNER_KEY, &user_id.to_string())?;
        Ok(foreign)
    }
}
