//! Namespace and NamespaceHandle
//!
//! A `Namespace` binds one Index Store to one Data Store and applies
//! quota admission to every write. A `NamespaceHandle` is what a session
//! holds: it marks the namespace as in use for as long as it lives and
//! carries the session's write permission.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::data::{
    parse_data_file_id, payload_crc, unix_timestamp, DataStore, Location, FLAG_DELETED,
    MAX_KEY_LEN,
};
use crate::error::{Result, ShelfError};
use crate::index::{encode_sequential_key, parse_index_file_id, IndexEntry, IndexStore, KeyMode};

use super::descriptor::{self, NamespaceSettings};
use super::watch::Watchers;

/// The Index/Data Store pair of a namespace
pub(crate) struct Stores {
    index: IndexStore,
    data: DataStore,
}

impl Stores {
    /// Open both stores and index any data entries the index missed
    fn open(data_dir: &Path, index_dir: &Path, mode: KeyMode, config: &Config) -> Result<Self> {
        let data = DataStore::open(data_dir, config.datafile_max_size, config.sync_strategy)?;
        let mut index =
            IndexStore::open(index_dir, mode, data.active_file_id(), config.sync_strategy)?;
        index.recover_tail(&data)?;
        Ok(Self { index, data })
    }

    /// Index the data entry just appended at `location`
    ///
    /// When the index record cannot be written the data entry is cut off
    /// again, so a write reported as failed never reappears after restart.
    fn publish(&mut self, location: Location, entry: IndexEntry) -> Result<()> {
        if let Err(e) = self.index.record(entry) {
            if let Err(undo) = self.data.discard_last(location) {
                tracing::error!(
                    "Unindexed entry at {}:{} left in {}: {}",
                    location.file_id,
                    location.offset,
                    self.data.dir().display(),
                    undo
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Result of a SET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// Key the value was stored under (assigned in Sequential mode)
    pub key: Vec<u8>,
    /// False when the payload matched the current value and nothing was written
    pub changed: bool,
}

/// One value from a key's history chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

/// Snapshot reported by NSINFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    pub mode: KeyMode,
    pub entries: usize,
    pub public: bool,
    pub protected: bool,
    pub data_size_bytes: u64,
    pub data_limits_bytes: u64,
    pub active_data_file: u16,
    pub sessions: usize,
}

/// An isolated keyspace
///
/// ## Concurrency:
/// - `settings`: RwLock, always taken before `stores`
/// - `stores`: RwLock; SET/DEL/RELOAD take it exclusively, reads share it
/// - `sessions`: handles currently outstanding (see `NamespaceHandle`)
pub struct Namespace {
    name: String,
    data_dir: PathBuf,
    index_dir: PathBuf,
    settings: RwLock<NamespaceSettings>,
    stores: RwLock<Stores>,
    sessions: AtomicUsize,
    watchers: Arc<Watchers>,
}

impl Namespace {
    /// Create a brand new namespace on disk
    pub(crate) fn create(name: &str, mode: KeyMode, config: &Config) -> Result<Self> {
        let index_dir = config.namespace_index_dir(name);
        std::fs::create_dir_all(&index_dir)?;

        let settings = NamespaceSettings::new(mode);
        descriptor::store(&index_dir, &settings)?;

        Self::open_with(name, settings, config)
    }

    /// Open an existing namespace from its descriptor and files
    pub(crate) fn open(name: &str, config: &Config) -> Result<Self> {
        let settings = descriptor::load(&config.namespace_index_dir(name))?;
        Self::open_with(name, settings, config)
    }

    fn open_with(name: &str, settings: NamespaceSettings, config: &Config) -> Result<Self> {
        let data_dir = config.namespace_data_dir(name);
        let index_dir = config.namespace_index_dir(name);
        let stores = Stores::open(&data_dir, &index_dir, settings.mode, config)?;

        tracing::info!(
            "Namespace '{}' loaded ({} mode, {} keys)",
            name,
            settings.mode.as_str(),
            stores.index.len()
        );

        Ok(Self {
            name: name.to_string(),
            data_dir,
            index_dir,
            settings: RwLock::new(settings),
            stores: RwLock::new(stores),
            sessions: AtomicUsize::new(0),
            watchers: Arc::new(Watchers::new()),
        })
    }

    // =========================================================================
    // Key Operations
    // =========================================================================

    /// Current payload of `key`
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let stores = self.stores.read();
        let entry = stores.index.lookup(key).ok_or(ShelfError::KeyNotFound)?;
        Ok(stores.data.read(entry.location())?.payload)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.stores.read().index.lookup(key).is_some()
    }

    /// Whether the current payload of `key` still matches its CRC32-C
    pub fn check(&self, key: &[u8]) -> Result<bool> {
        let stores = self.stores.read();
        let entry = stores.index.lookup(key).ok_or(ShelfError::KeyNotFound)?;
        stores.data.check(entry.location())
    }

    /// Admission-controlled write
    ///
    /// In Sequential mode `key` is `None` for a new value, or names an
    /// existing key to overwrite.
    pub(crate) fn set(
        &self,
        key: Option<&[u8]>,
        payload: &[u8],
        timestamp: Option<u64>,
    ) -> Result<SetOutcome> {
        let settings = self.settings.read();
        let mut guard = self.stores.write();
        let Stores { index, data } = &mut *guard;

        let key = match (settings.mode, key) {
            (KeyMode::UserKey, Some(k)) => {
                if k.is_empty() || k.len() > MAX_KEY_LEN {
                    return Err(ShelfError::InvalidValue("Key too large".to_string()));
                }
                k.to_vec()
            }
            (KeyMode::UserKey, None) => {
                return Err(ShelfError::InvalidValue("Missing key".to_string()));
            }
            (KeyMode::Sequential, None) => {
                encode_sequential_key(index.next_sequential_key().unwrap_or_default())
            }
            (KeyMode::Sequential, Some(k)) => {
                if index.lookup(k).is_none() {
                    return Err(ShelfError::InvalidValue(
                        "Invalid key, only update authorized".to_string(),
                    ));
                }
                k.to_vec()
            }
        };

        let integrity = payload_crc(payload);
        let existing = index.lookup(&key).cloned();

        if let Some(current) = &existing {
            if current.length as usize == payload.len() && current.integrity == integrity {
                match data.read(current.location()) {
                    Ok(stored) if stored.payload == payload => {
                        tracing::trace!("Namespace '{}': unchanged value, skipping write", self.name);
                        return Ok(SetOutcome { key, changed: false });
                    }
                    Ok(_) | Err(ShelfError::CorruptEntry { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let old_len = existing.as_ref().map_or(0, |e| e.length as u64);
        let new_len = payload.len() as u64;
        if new_len > old_len {
            if let Some(limit) = settings.max_size {
                let used = index.used_bytes();
                let delta = new_len - old_len;
                if used + delta > limit {
                    tracing::debug!(
                        "Namespace '{}': quota reached ({} + {} > {})",
                        self.name,
                        used,
                        delta,
                        limit
                    );
                    return Err(ShelfError::QuotaExceeded { used, delta, limit });
                }
            }
        }

        let timestamp = timestamp.unwrap_or_else(unix_timestamp);
        let previous = existing.as_ref().map(IndexEntry::location);
        let location = data.append(&key, payload, previous, timestamp)?;

        guard.publish(
            location,
            IndexEntry {
                key: key.clone(),
                data_file_id: location.file_id,
                offset: location.offset,
                length: payload.len() as u32,
                flags: 0,
                timestamp,
                integrity,
            },
        )?;

        Ok(SetOutcome { key, changed: true })
    }

    /// Remove `key` by appending a deletion marker
    pub(crate) fn delete(&self, key: &[u8]) -> Result<()> {
        let mut guard = self.stores.write();
        let Stores { index, data } = &mut *guard;

        let existing = index.lookup(key).cloned().ok_or(ShelfError::KeyNotFound)?;
        let timestamp = unix_timestamp();
        let location = data.append_tombstone(key, Some(existing.location()), timestamp)?;

        guard.publish(
            location,
            IndexEntry {
                key: key.to_vec(),
                data_file_id: location.file_id,
                offset: location.offset,
                length: 0,
                flags: FLAG_DELETED,
                timestamp,
                integrity: 0,
            },
        )?;
        Ok(())
    }

    /// Values of `key`, newest first
    pub fn history(&self, key: &[u8]) -> Result<Vec<HistoryItem>> {
        let stores = self.stores.read();
        let entry = stores.index.lookup(key).ok_or(ShelfError::KeyNotFound)?;

        let mut items = Vec::new();
        for step in stores.data.history(entry.location()) {
            let (_, value) = step?;
            if value.is_deleted() {
                continue;
            }
            items.push(HistoryItem {
                timestamp: value.header.timestamp,
                payload: value.payload,
            });
        }
        Ok(items)
    }

    /// Entry following `after` in insertion order, or the first one
    pub fn scan(&self, after: Option<&[u8]>) -> Result<IndexEntry> {
        self.stores.read().index.scan_forward(after).cloned()
    }

    /// Entry preceding `before` in insertion order, or the last one
    pub fn rscan(&self, before: Option<&[u8]>) -> Result<IndexEntry> {
        self.stores.read().index.scan_backward(before).cloned()
    }

    /// Current payloads of `keys` read under one lock, `None` for absent keys
    pub fn get_many(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        let stores = self.stores.read();
        keys.iter()
            .map(|key| match stores.index.lookup(key) {
                Some(entry) => Ok(Some(stores.data.read(entry.location())?.payload)),
                None => Ok(None),
            })
            .collect()
    }

    /// Live keys starting with `prefix`, in scan order
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let stores = self.stores.read();
        if stores.index.mode() != KeyMode::UserKey {
            return Err(ShelfError::InvalidValue(
                "prefix scan needs a userkey namespace".to_string(),
            ));
        }

        Ok(stores
            .index
            .entries()
            .filter(|entry| entry.key.starts_with(prefix))
            .map(|entry| entry.key.clone())
            .collect())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Discard in-memory state and reopen everything from disk
    pub(crate) fn reload(&self, config: &Config) -> Result<()> {
        let mut settings = self.settings.write();
        let mut stores = self.stores.write();

        let fresh_settings = descriptor::load(&self.index_dir)?;
        let fresh_stores =
            Stores::open(&self.data_dir, &self.index_dir, fresh_settings.mode, config)?;

        tracing::info!(
            "Namespace '{}' reloaded ({} keys)",
            self.name,
            fresh_stores.index.len()
        );

        *settings = fresh_settings;
        *stores = fresh_stores;
        Ok(())
    }

    /// Remove every data and index file and start over empty
    ///
    /// The descriptor is kept, so settings and mode survive.
    pub(crate) fn flush(&self, config: &Config) -> Result<()> {
        let settings = self.settings.read();
        let mut stores = self.stores.write();

        remove_files(&self.data_dir, |path| parse_data_file_id(path).is_some())?;
        remove_files(&self.index_dir, |path| parse_index_file_id(path).is_some())?;

        *stores = Stores::open(&self.data_dir, &self.index_dir, settings.mode, config)?;

        tracing::info!("Namespace '{}' flushed", self.name);
        Ok(())
    }

    /// Apply a change to the settings and persist the descriptor
    pub(crate) fn update_settings<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut NamespaceSettings),
    {
        let mut settings = self.settings.write();
        let mut updated = settings.clone();
        change(&mut updated);
        descriptor::store(&self.index_dir, &updated)?;
        *settings = updated;
        Ok(())
    }

    /// Flush data and index files
    pub fn sync(&self) -> Result<()> {
        let mut stores = self.stores.write();
        stores.data.sync()?;
        stores.index.sync()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> KeyMode {
        self.settings.read().mode
    }

    pub fn settings(&self) -> NamespaceSettings {
        self.settings.read().clone()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.stores.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.read().index.is_empty()
    }

    /// Sum of live payload lengths
    pub fn used_bytes(&self) -> u64 {
        self.stores.read().index.used_bytes()
    }

    /// Handles currently outstanding
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn watchers(&self) -> &Watchers {
        &self.watchers
    }

    /// Watchers that outlive a switch to another namespace
    pub(crate) fn shared_watchers(&self) -> Arc<Watchers> {
        Arc::clone(&self.watchers)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn info(&self) -> NamespaceInfo {
        let settings = self.settings.read();
        let stores = self.stores.read();

        NamespaceInfo {
            name: self.name.clone(),
            mode: settings.mode,
            entries: stores.index.len(),
            public: settings.public,
            protected: settings.is_protected(),
            data_size_bytes: stores.index.used_bytes(),
            data_limits_bytes: settings.max_size.unwrap_or(0),
            active_data_file: stores.data.active_file_id(),
            sessions: self.sessions(),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// A session's hold on a namespace
///
/// The namespace counts as in use while any handle exists; NSDEL refuses
/// to remove it. Writes go through the handle so read-only selections
/// are enforced in one place.
pub struct NamespaceHandle {
    namespace: Arc<Namespace>,
    writable: bool,
}

impl NamespaceHandle {
    pub(crate) fn new(namespace: Arc<Namespace>, writable: bool) -> Self {
        namespace.sessions.fetch_add(1, Ordering::SeqCst);
        Self { namespace, writable }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// SET with the current time as timestamp
    pub fn set(&self, key: Option<&[u8]>, payload: &[u8]) -> Result<SetOutcome> {
        self.ensure_writable()?;
        self.namespace.set(key, payload, None)
    }

    /// SET with an explicit timestamp
    pub fn set_with_timestamp(
        &self,
        key: Option<&[u8]>,
        payload: &[u8],
        timestamp: u64,
    ) -> Result<SetOutcome> {
        self.ensure_writable()?;
        self.namespace.set(key, payload, Some(timestamp))
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.namespace.delete(key)
    }

    /// Empty the namespace; only a private, password protected namespace
    /// selected with its password can be flushed
    pub fn flush(&self, config: &Config) -> Result<()> {
        self.ensure_writable()?;
        let settings = self.namespace.settings();
        if settings.public || !settings.is_protected() {
            return Err(ShelfError::Forbidden(
                "flushing public namespace denied".to_string(),
            ));
        }
        self.namespace.flush(config)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(ShelfError::Forbidden(format!(
                "namespace '{}' is selected read-only",
                self.namespace.name
            )))
        }
    }
}

impl Deref for NamespaceHandle {
    type Target = Namespace;

    fn deref(&self) -> &Namespace {
        &self.namespace
    }
}

impl Clone for NamespaceHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.namespace), self.writable)
    }
}

impl Drop for NamespaceHandle {
    fn drop(&mut self) {
        self.namespace.sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Remove the files in `dir` selected by `owned`
fn remove_files<F>(dir: &Path, owned: F) -> Result<()>
where
    F: Fn(&Path) -> bool,
{
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && owned(&path) {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
