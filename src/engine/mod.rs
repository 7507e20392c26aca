//! Engine Module
//!
//! Process-scoped context shared by every connection.
//!
//! ## Responsibilities
//! - Own the configuration and the namespace registry
//! - Hand out client sessions bound to the default namespace
//! - Keep server-wide counters for INFO
//! - Carry the shutdown signal raised by STOP

mod session;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::Result;
use crate::namespace::NamespaceManager;

pub use session::Session;

/// Server-wide counters
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Commands executed, successful or not
    pub commands: AtomicU64,
    /// Connections accepted since start
    pub connections: AtomicU64,
    /// Connections currently open
    pub clients: AtomicUsize,
}

/// The storage engine
///
/// ## Concurrency Model
///
/// The engine itself holds no lock. Each namespace serializes its own
/// writers and lets readers run in parallel; operations on different
/// namespaces never contend.
pub struct Engine {
    config: Config,
    namespaces: NamespaceManager,
    stats: EngineStats,
    started: Instant,
    shutdown: AtomicBool,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const DATA_DIRNAME: &'static str = "data";
    const INDEX_DIRNAME: &'static str = "index";

    /// Open or create an engine with the given config
    ///
    /// On startup every namespace found in the index directory is loaded
    /// and the default namespace is created if missing.
    pub fn open(config: Config) -> Result<Self> {
        let namespaces = NamespaceManager::open(config.clone())?;

        tracing::info!(
            "Engine ready: data={} index={}",
            config.data_dir.display(),
            config.index_dir.display()
        );

        Ok(Self {
            config,
            namespaces,
            stats: EngineStats::default(),
            started: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Open with a single root directory (convenience method)
    ///
    /// Data and index files go to `data/` and `index/` under `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path.join(Self::DATA_DIRNAME))
            .index_dir(path.join(Self::INDEX_DIRNAME))
            .build();
        Self::open(config)
    }

    /// Start a client session on the default namespace
    pub fn session(self: &Arc<Self>) -> Result<Session> {
        Session::new(Arc::clone(self))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Ask the server loop to stop accepting connections
    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Flush every namespace to disk
    pub fn sync_all(&self) -> Result<()> {
        self.namespaces.sync_all()
    }
}
