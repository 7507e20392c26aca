//! Data Store Module
//!
//! Append-only log of entries per namespace, split across size-bounded files.
//!
//! ## Responsibilities
//! - Append entries with a CRC32-C over the payload
//! - Link each entry to the previous entry of the same key (history chain)
//! - Rotate to a new file when the active one would exceed its size bound
//! - Truncate a partially written tail on open
//!
//! ## File Format
//! ```text
//! zdb-data-NNNNN
//! ┌──────────────────────────────────────────┐
//! │ Header                                   │
//! │ ┌───────────┬─────────────┬────────────┐ │
//! │ │"DAT0" (4) │ Version (4) │ FileId (2) │ │
//! │ └───────────┴─────────────┴────────────┘ │
//! ├──────────────────────────────────────────┤
//! │ Entry                                    │
//! │ ┌────────┬────────┬───────┬────────────┐ │
//! │ │KeyLen 1│PayLen 4│Flags 1│Timestamp 8 │ │
//! │ ├────────┴──┬─────┴───────┴─┬──────────┤ │
//! │ │ CRC32-C 4 │ PrevFile 2    │PrevOff 8 │ │
//! │ ├───────────┴───────────────┴──────────┤ │
//! │ │ Key (KeyLen) │ Payload (PayLen)      │ │
//! │ └──────────────┴───────────────────────┘ │
//! ├──────────────────────────────────────────┤
//! │ Entry ...                                │
//! └──────────────────────────────────────────┘
//! ```
//!
//! A previous offset of 0 marks the end of a chain: offset 0 always holds
//! the file header, never an entry.

mod entry;
mod reader;
mod store;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use entry::{payload_crc, DataEntry, EntryHeader};
pub use reader::DataFileReader;
pub use store::{DataStore, History};

/// Magic bytes at the start of every data file
pub const MAGIC: &[u8; 4] = b"DAT0";

/// Data file format version
pub const VERSION: u32 = 1;

/// Header size: magic (4) + version (4) + file id (2)
pub const HEADER_SIZE: u64 = 10;

/// Fixed part of an entry preceding key and payload
pub const ENTRY_HEADER_SIZE: usize = 28;

/// Entry flag: this entry is a deletion marker
pub const FLAG_DELETED: u8 = 0x01;

/// Longest key accepted by the store
pub const MAX_KEY_LEN: usize = 255;

/// Filename prefix shared by all data files
pub const FILE_PREFIX: &str = "zdb-data-";

/// Position of an entry inside a namespace's data files
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub file_id: u16,
    pub offset: u64,
}

impl Location {
    pub fn new(file_id: u16, offset: u64) -> Self {
        Self { file_id, offset }
    }
}

/// Path of the data file with the given id
pub fn data_file_path(dir: &Path, id: u16) -> PathBuf {
    dir.join(format!("{}{:05}", FILE_PREFIX, id))
}

/// Parse a data file id from its filename
/// "zdb-data-00042" → Some(42)
pub fn parse_data_file_id(path: &Path) -> Option<u16> {
    let name = path.file_name()?.to_str()?;
    let id_str = name.strip_prefix(FILE_PREFIX)?;
    if id_str.is_empty() || !id_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id_str.parse().ok()
}

/// Current wall clock as unix seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
