//! Namespace Manager
//!
//! Process-wide registry of namespaces and their lifecycle.
//!
//! ## Responsibilities
//! - Load every namespace found on disk at startup
//! - Create, select, configure, reload and delete namespaces
//! - Enforce password checks on selection
//! - Refuse deletion of namespaces that are selected or hold keys

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Result, ShelfError};
use crate::index::KeyMode;

use super::descriptor::DESCRIPTOR_FILENAME;
use super::handle::{Namespace, NamespaceHandle, NamespaceInfo};

/// Name of the namespace that always exists
pub const DEFAULT_NAMESPACE: &str = "default";

/// Longest accepted namespace name
pub const MAX_NAME_LEN: usize = 128;

/// Longest password accepted by SELECT
pub const MAX_PASSWORD_LEN: usize = 255;

/// Longest value accepted by NSSET
pub const MAX_PROPERTY_VALUE_LEN: usize = 63;

/// NSSET password value that removes protection
pub const CLEAR_PASSWORD: &str = "*";

/// Properties NSSET can change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Public,
    Password,
    MaxSize,
}

impl Property {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "public" => Ok(Property::Public),
            "password" => Ok(Property::Password),
            "maxsize" => Ok(Property::MaxSize),
            other => Err(ShelfError::UnknownProperty(other.to_string())),
        }
    }
}

/// Reject names that are empty, too long or able to escape the data root
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShelfError::InvalidName("empty name".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ShelfError::InvalidName(format!(
            "name longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    if name == "." || name == ".." {
        return Err(ShelfError::InvalidName(name.to_string()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(ShelfError::InvalidName(format!(
            "'{}' contains a path separator",
            name.escape_default()
        )));
    }
    Ok(())
}

/// Registry of all namespaces in one process
///
/// ## Concurrency:
/// - `namespaces`: RwLock; lookups share it, NSNEW/NSDEL take it exclusively
/// - Handles are created while the registry lock is held, so NSDEL sees
///   every selection that raced with it
pub struct NamespaceManager {
    config: Config,
    namespaces: RwLock<BTreeMap<String, Arc<Namespace>>>,
}

impl NamespaceManager {
    /// Load all namespaces from disk, creating the default one if needed
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        fs::create_dir_all(&config.index_dir)?;

        let mut namespaces = BTreeMap::new();

        for entry in fs::read_dir(&config.index_dir)? {
            let path = entry?.path();
            if !path.is_dir() || !path.join(DESCRIPTOR_FILENAME).exists() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Err(e) = validate_name(name) {
                tracing::warn!("Skipping namespace directory {}: {}", path.display(), e);
                continue;
            }

            let namespace = Namespace::open(name, &config)?;
            namespaces.insert(name.to_string(), Arc::new(namespace));
        }

        if !namespaces.contains_key(DEFAULT_NAMESPACE) {
            let namespace = Namespace::create(DEFAULT_NAMESPACE, config.default_mode, &config)?;
            namespaces.insert(DEFAULT_NAMESPACE.to_string(), Arc::new(namespace));
        }

        tracing::info!("Loaded {} namespace(s)", namespaces.len());

        Ok(Self {
            config,
            namespaces: RwLock::new(namespaces),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an empty namespace (NSNEW)
    ///
    /// `mode` defaults to the configured default mode.
    pub fn create(&self, name: &str, mode: Option<KeyMode>) -> Result<()> {
        validate_name(name)?;

        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(name) {
            return Err(ShelfError::AlreadyExists(name.to_string()));
        }

        // Files left behind by something other than this registry
        if self.config.namespace_index_dir(name).exists()
            || self.config.namespace_data_dir(name).exists()
        {
            return Err(ShelfError::AlreadyExists(name.to_string()));
        }

        let mode = mode.unwrap_or(self.config.default_mode);
        let namespace = Namespace::create(name, mode, &self.config)?;
        namespaces.insert(name.to_string(), Arc::new(namespace));

        tracing::info!("Namespace '{}' created ({} mode)", name, mode.as_str());
        Ok(())
    }

    /// Select a namespace for a session (SELECT)
    ///
    /// Passwords must match exactly. A protected public namespace selected
    /// without a password is handed out read-only.
    pub fn select(&self, name: &str, password: Option<&str>) -> Result<NamespaceHandle> {
        if password.map_or(false, |p| p.len() > MAX_PASSWORD_LEN) {
            return Err(ShelfError::AuthFailed);
        }

        let namespaces = self.namespaces.read();
        let namespace = namespaces
            .get(name)
            .ok_or_else(|| ShelfError::NamespaceNotFound(name.to_string()))?;

        let settings = namespace.settings();
        let writable = match (settings.password.as_deref(), password) {
            (None, _) => true,
            (Some(expected), Some(given)) if expected == given => true,
            (Some(_), Some(_)) => return Err(ShelfError::AuthFailed),
            (Some(_), None) if settings.public => false,
            (Some(_), None) => return Err(ShelfError::AuthFailed),
        };

        Ok(NamespaceHandle::new(Arc::clone(namespace), writable))
    }

    /// Writable handle without any password check
    pub fn get(&self, name: &str) -> Result<NamespaceHandle> {
        let namespaces = self.namespaces.read();
        let namespace = namespaces
            .get(name)
            .ok_or_else(|| ShelfError::NamespaceNotFound(name.to_string()))?;
        Ok(NamespaceHandle::new(Arc::clone(namespace), true))
    }

    /// Change one property of a namespace (NSSET)
    pub fn set(&self, name: &str, property: &str, value: &str) -> Result<()> {
        let namespace = self.lookup(name)?;

        if name == DEFAULT_NAMESPACE {
            return Err(ShelfError::Forbidden(
                "default namespace cannot be changed".to_string(),
            ));
        }
        if value.len() > MAX_PROPERTY_VALUE_LEN {
            return Err(ShelfError::InvalidValue(format!(
                "value longer than {} bytes",
                MAX_PROPERTY_VALUE_LEN
            )));
        }

        match Property::parse(property)? {
            Property::Public => {
                let public = match value {
                    "1" => true,
                    "0" => false,
                    other => {
                        return Err(ShelfError::InvalidValue(format!(
                            "public expects 0 or 1, got '{}'",
                            other
                        )))
                    }
                };
                namespace.update_settings(|s| s.public = public)?;
            }
            Property::Password => {
                let password = if value == CLEAR_PASSWORD {
                    None
                } else {
                    Some(value.to_string())
                };
                namespace.update_settings(|s| s.password = password)?;
            }
            Property::MaxSize => {
                let size: u64 = value.parse().map_err(|_| {
                    ShelfError::InvalidValue(format!("maxsize expects bytes, got '{}'", value))
                })?;
                let max_size = if size == 0 { None } else { Some(size) };
                namespace.update_settings(|s| s.max_size = max_size)?;
            }
        }

        tracing::info!("Namespace '{}': {} updated", name, property);
        Ok(())
    }

    /// Delete a namespace and its files (NSDEL)
    pub fn delete(&self, name: &str) -> Result<()> {
        if name == DEFAULT_NAMESPACE {
            return Err(ShelfError::Forbidden(
                "default namespace cannot be deleted".to_string(),
            ));
        }

        let mut namespaces = self.namespaces.write();
        let namespace = namespaces
            .get(name)
            .ok_or_else(|| ShelfError::NamespaceNotFound(name.to_string()))?;

        if namespace.sessions() > 0 {
            return Err(ShelfError::InUse(name.to_string()));
        }
        if !namespace.is_empty() {
            return Err(ShelfError::NotEmpty(name.to_string()));
        }

        fs::remove_dir_all(namespace.index_dir())?;
        fs::remove_dir_all(namespace.data_dir())?;
        namespaces.remove(name);

        tracing::info!("Namespace '{}' deleted", name);
        Ok(())
    }

    /// Re-read a namespace from disk (RELOAD)
    pub fn reload(&self, name: &str) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(ShelfError::InvalidName(format!(
                "name longer than {} bytes",
                MAX_NAME_LEN
            )));
        }
        self.lookup(name)?.reload(&self.config)
    }

    /// Snapshot of a namespace for NSINFO
    pub fn info(&self, name: &str) -> Result<NamespaceInfo> {
        Ok(self.lookup(name)?.info())
    }

    /// Names of all namespaces, sorted
    pub fn list(&self) -> Vec<String> {
        self.namespaces.read().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.namespaces.read().len()
    }

    /// Flush every namespace to disk
    pub fn sync_all(&self) -> Result<()> {
        let namespaces: Vec<Arc<Namespace>> = self.namespaces.read().values().cloned().collect();
        for namespace in namespaces {
            namespace.sync()?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Arc<Namespace>> {
        self.namespaces
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ShelfError::NamespaceNotFound(name.to_string()))
    }
}
