//! Namespace descriptor
//!
//! Persisted settings of a namespace, stored as `zdb-namespace` in the
//! namespace's index directory.
//!
//! ```text
//! ┌──────────┬────────────┬──────────────────────┐
//! │ CRC (4)  │ Len (4)    │ bincode(Settings)    │
//! └──────────┴────────────┴──────────────────────┘
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShelfError};
use crate::index::KeyMode;

/// Filename of the descriptor inside a namespace's index directory
pub const DESCRIPTOR_FILENAME: &str = "zdb-namespace";

const DESCRIPTOR_VERSION: u32 = 1;

/// Mutable settings of a namespace plus its fixed addressing mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSettings {
    pub version: u32,
    pub mode: KeyMode,
    pub public: bool,
    pub password: Option<String>,
    /// Byte quota on live payloads; `None` means unlimited
    pub max_size: Option<u64>,
}

impl NamespaceSettings {
    /// Settings of a freshly created namespace
    pub fn new(mode: KeyMode) -> Self {
        Self {
            version: DESCRIPTOR_VERSION,
            mode,
            public: true,
            password: None,
            max_size: None,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.password.is_some()
    }
}

pub fn descriptor_path(index_dir: &Path) -> PathBuf {
    index_dir.join(DESCRIPTOR_FILENAME)
}

/// Load the descriptor from a namespace's index directory
pub fn load(index_dir: &Path) -> Result<NamespaceSettings> {
    load_file(&descriptor_path(index_dir))
}

/// Load a descriptor from an explicit file path
pub fn load_file(path: &Path) -> Result<NamespaceSettings> {
    let bytes = fs::read(path)?;

    let invalid = |reason: &str| ShelfError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if bytes.len() < 8 {
        return Err(invalid("descriptor shorter than its header"));
    }

    let mut header = &bytes[..8];
    let stored_crc = header.get_u32_le();
    let len = header.get_u32_le() as usize;
    let body = bytes
        .get(8..8 + len)
        .ok_or_else(|| invalid("descriptor body truncated"))?;

    if crc32fast::hash(body) != stored_crc {
        return Err(invalid("descriptor checksum mismatch"));
    }

    let settings: NamespaceSettings = bincode::deserialize(body)?;
    Ok(settings)
}

/// Persist the descriptor, replacing any previous one atomically
pub fn store(index_dir: &Path, settings: &NamespaceSettings) -> Result<()> {
    let body = bincode::serialize(settings)?;

    let mut bytes = Vec::with_capacity(8 + body.len());
    bytes.put_u32_le(crc32fast::hash(&body));
    bytes.put_u32_le(body.len() as u32);
    bytes.put_slice(&body);

    let path = descriptor_path(index_dir);
    let tmp = index_dir.join(format!("{}.tmp", DESCRIPTOR_FILENAME));

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    fs::rename(&tmp, &path)?;
    File::open(index_dir)?.sync_all()?;
    Ok(())
}
