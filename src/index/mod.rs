//! Index Store Module
//!
//! Per-namespace directory mapping a key to its location in the data files.
//!
//! ## Responsibilities
//! - Point lookup, upsert and removal of keys
//! - Insertion-ordered forward/backward traversal (SCAN/RSCAN)
//! - Sequential key allocation in `Sequential` mode
//! - Persist one index record per data entry, in the index file
//!   sharing the data file's id
//! - Reconstruct itself from data files alone (rebuild)
//!
//! ## File Format
//! ```text
//! zdb-index-NNNNN
//! ┌───────────────────────────────────────────────────┐
//! │ Header                                            │
//! │ ┌───────────┬─────────────┬────────────┬────────┐ │
//! │ │"IDX0" (4) │ Version (4) │ FileId (2) │Mode (1)│ │
//! │ └───────────┴─────────────┴────────────┴────────┘ │
//! ├───────────────────────────────────────────────────┤
//! │ Record (one per data entry, same order)           │
//! │ ┌────────┬─────────┬─────────┬────────┬─────────┐ │
//! │ │KeyLen 1│DataFile 2│Offset 8│Length 4│ Flags 1 │ │
//! │ ├────────┴──┬──────┴────┬────┴────────┴─────────┤ │
//! │ │Timestamp 8│ CRC32-C 4 │ Key (KeyLen)          │ │
//! │ └───────────┴───────────┴───────────────────────┘ │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Index files carry no wall-clock data of their own, so the files
//! written live and the files produced by a rebuild are byte-identical.

mod entry;
mod file;
mod keys;
mod store;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use entry::IndexEntry;
pub use file::{read_index_file, IndexFileBuilder, IndexFileWriter};
pub use keys::{KeyIndex, SequentialIndex, UserKeyIndex};
pub use store::{rebuild_from, IndexStore, RebuildSummary};

use crate::error::{Result, ShelfError};

/// Magic bytes at the start of every index file
pub const MAGIC: &[u8; 4] = b"IDX0";

/// Index file format version
pub const VERSION: u32 = 1;

/// Header size: magic (4) + version (4) + file id (2) + mode (1)
pub const HEADER_SIZE: u64 = 11;

/// Fixed part of a record preceding the key
pub const RECORD_HEADER_SIZE: usize = 28;

/// Filename prefix shared by all index files
pub const FILE_PREFIX: &str = "zdb-index-";

/// Addressing mode of a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyMode {
    /// Caller supplies arbitrary key bytes
    UserKey,
    /// Engine assigns increasing integer keys
    Sequential,
}

impl KeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyMode::UserKey => "userkey",
            KeyMode::Sequential => "sequential",
        }
    }

    /// Parse "user"/"userkey" or "seq"/"sequential"
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "user" | "userkey" => Ok(KeyMode::UserKey),
            "seq" | "sequential" => Ok(KeyMode::Sequential),
            other => Err(ShelfError::InvalidValue(format!("unknown mode '{}'", other))),
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            KeyMode::UserKey => 0,
            KeyMode::Sequential => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(KeyMode::UserKey),
            1 => Some(KeyMode::Sequential),
            _ => None,
        }
    }
}

/// Path of the index file with the given id
pub fn index_file_path(dir: &Path, id: u16) -> PathBuf {
    dir.join(format!("{}{:05}", FILE_PREFIX, id))
}

/// Parse an index file id from its filename
/// "zdb-index-00042" → Some(42)
pub fn parse_index_file_id(path: &Path) -> Option<u16> {
    let name = path.file_name()?.to_str()?;
    let id_str = name.strip_prefix(FILE_PREFIX)?;
    if id_str.is_empty() || !id_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id_str.parse().ok()
}

/// Encode a sequential key as it travels on the wire and on disk
pub fn encode_sequential_key(id: u64) -> Vec<u8> {
    id.to_le_bytes().to_vec()
}

/// Decode a sequential key; anything but 8 bytes is not a sequential key
pub fn decode_sequential_key(key: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = key.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}
