//! Index Files
//!
//! Writer for the live index file, an in-memory builder used by rebuild,
//! and a loader shared by startup and RELOAD.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::{Buf, BufMut, BytesMut};

use crate::config::SyncStrategy;
use crate::error::{Result, ShelfError};

use super::entry::IndexEntry;
use super::{index_file_path, KeyMode, HEADER_SIZE, MAGIC, VERSION};

fn encode_header(buf: &mut BytesMut, file_id: u16, mode: KeyMode) {
    buf.put_slice(MAGIC);
    buf.put_u32_le(VERSION);
    buf.put_u16_le(file_id);
    buf.put_u8(mode.to_byte());
}

// =============================================================================
// Live Writer
// =============================================================================

/// Append handle on the index file matching the active data file
pub struct IndexFileWriter {
    file: File,
    file_id: u16,
    /// Length of the file up to the last complete record
    size: u64,
    mode: KeyMode,
    sync_strategy: SyncStrategy,
    last_sync: Instant,
}

impl IndexFileWriter {
    /// Open index file `id` for appending, creating it with a header if needed
    pub fn open(dir: &Path, id: u16, mode: KeyMode, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = index_file_path(dir, id);

        let (file, size) = if path.exists() {
            let file = OpenOptions::new().append(true).open(&path)?;
            let size = file.metadata()?.len();
            (file, size)
        } else {
            let mut file = OpenOptions::new()
                .create_new(true)
                .append(true)
                .open(&path)?;
            let mut header = BytesMut::with_capacity(HEADER_SIZE as usize);
            encode_header(&mut header, id, mode);
            file.write_all(&header)?;
            file.sync_all()?;
            (file, HEADER_SIZE)
        };

        Ok(Self {
            file,
            file_id: id,
            size,
            mode,
            sync_strategy,
            last_sync: Instant::now(),
        })
    }

    pub fn file_id(&self) -> u16 {
        self.file_id
    }

    /// Bytes in the file, header included
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append one record, rolling the file over when the record belongs
    /// to a newer data file
    pub fn append(&mut self, dir: &Path, entry: &IndexEntry) -> Result<()> {
        if entry.data_file_id != self.file_id {
            self.file.sync_all()?;
            *self = Self::open(dir, entry.data_file_id, self.mode, self.sync_strategy)?;
        }

        let mut buf = BytesMut::new();
        entry.encode(&mut buf);

        if let Err(e) = self.file.write_all(&buf) {
            // Drop whatever part of the record reached the file
            if let Err(trunc) = self.file.set_len(self.size) {
                tracing::error!(
                    "Failed to roll back partial write in index file {}: {}",
                    self.file_id,
                    trunc
                );
            }
            return Err(e.into());
        }
        self.size += buf.len() as u64;

        if self.sync_strategy.is_due(self.last_sync) {
            self.file.sync_data()?;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.last_sync = Instant::now();
        Ok(())
    }
}

// =============================================================================
// Offline Builder
// =============================================================================

/// Buffers a complete index file in memory and commits it in one write
pub struct IndexFileBuilder {
    file_id: u16,
    buf: BytesMut,
    records: u64,
}

impl IndexFileBuilder {
    pub fn new(file_id: u16, mode: KeyMode) -> Self {
        let mut buf = BytesMut::with_capacity(4096);
        encode_header(&mut buf, file_id, mode);
        Self {
            file_id,
            buf,
            records: 0,
        }
    }

    pub fn add(&mut self, entry: &IndexEntry) {
        entry.encode(&mut self.buf);
        self.records += 1;
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Write the file into `dir`; an existing file is never overwritten
    pub fn commit(self, dir: &Path) -> Result<PathBuf> {
        let path = index_file_path(dir, self.file_id);
        let mut file = OpenOptions::new().create_new(true).write(true).open(&path)?;
        file.write_all(&self.buf)?;
        file.sync_all()?;
        Ok(path)
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Parsed contents of one index file
#[derive(Debug)]
pub struct IndexFileContents {
    pub file_id: u16,
    pub mode: KeyMode,
    pub entries: Vec<IndexEntry>,
    /// Length up to the end of the last complete record
    pub valid_len: u64,
    pub file_len: u64,
}

/// Read every complete record of an index file
pub fn read_index_file(path: &Path) -> Result<IndexFileContents> {
    let bytes = fs::read(path)?;
    let invalid = |reason: String| ShelfError::InvalidHeader {
        path: path.to_path_buf(),
        reason,
    };

    if bytes.len() < HEADER_SIZE as usize {
        return Err(invalid("file shorter than header".to_string()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(invalid(format!("expected magic IDX0, got {:?}", &bytes[0..4])));
    }

    let mut header = &bytes[4..HEADER_SIZE as usize];
    let version = header.get_u32_le();
    if version != VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }
    let file_id = header.get_u16_le();
    let mode_byte = header.get_u8();
    let mode = KeyMode::from_byte(mode_byte)
        .ok_or_else(|| invalid(format!("unknown mode byte {}", mode_byte)))?;

    let mut entries = Vec::new();
    let mut pos = HEADER_SIZE as usize;
    while let Some((entry, used)) = IndexEntry::decode(&bytes[pos..]) {
        entries.push(entry);
        pos += used;
    }

    Ok(IndexFileContents {
        file_id,
        mode,
        entries,
        valid_len: pos as u64,
        file_len: bytes.len() as u64,
    })
}
