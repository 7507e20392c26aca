//! Configuration for shelfdb
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::index::KeyMode;

/// Main configuration for a shelfdb instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {namespace}/
    ///           ├── zdb-data-00000
    ///           └── zdb-data-00001
    pub data_dir: PathBuf,

    /// Root directory for index files and namespace descriptors
    /// Internal structure:
    ///   {index_dir}/
    ///     └── {namespace}/
    ///           ├── zdb-namespace
    ///           └── zdb-index-00000
    pub index_dir: PathBuf,

    /// A data file is sealed once an append would push it past this size
    pub datafile_max_size: u64,

    /// How often data and index files are fsynced
    pub sync_strategy: SyncStrategy,

    /// Addressing mode of the default namespace and of new namespaces
    pub default_mode: KeyMode,

    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Admin password checked by AUTH; `None` makes every connection admin
    pub admin_password: Option<String>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 disables)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 disables)
    pub write_timeout_ms: u64,
}

/// File sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync when at least `seconds` elapsed since the previous sync
    Interval { seconds: u64 },

    /// Leave flushing to the operating system
    OsManaged,
}

impl SyncStrategy {
    /// Whether a file last synced at `last_sync` is due for an fsync
    pub fn is_due(&self, last_sync: Instant) -> bool {
        match *self {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::Interval { seconds } => {
                last_sync.elapsed() >= Duration::from_secs(seconds)
            }
            SyncStrategy::OsManaged => false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./shelfdb-data"),
            index_dir: PathBuf::from("./shelfdb-index"),
            datafile_max_size: 256 * 1024 * 1024, // 256 MB
            sync_strategy: SyncStrategy::OsManaged,
            default_mode: KeyMode::UserKey,
            admin_password: None,
            listen_addr: "127.0.0.1:9900".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Data directory of one namespace
    pub fn namespace_data_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Index directory of one namespace
    pub fn namespace_index_dir(&self, name: &str) -> PathBuf {
        self.index_dir.join(name)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the index directory
    pub fn index_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_dir = path.into();
        self
    }

    /// Set the data file rotation size (in bytes)
    pub fn datafile_max_size(mut self, size: u64) -> Self {
        self.config.datafile_max_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the addressing mode used by the default namespace
    pub fn default_mode(mut self, mode: KeyMode) -> Self {
        self.config.default_mode = mode;
        self
    }

    /// Set the admin password
    pub fn admin_password(mut self, password: impl Into<String>) -> Self {
        self.config.admin_password = Some(password.into());
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
