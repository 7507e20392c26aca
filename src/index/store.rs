//! Index Store
//!
//! In-memory key index of one namespace backed by its index files.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::data::{data_file_path, DataFileReader, DataStore, Location};
use crate::error::{Result, ShelfError};

use super::entry::IndexEntry;
use super::file::{read_index_file, IndexFileBuilder, IndexFileWriter};
use super::keys::KeyIndex;
use super::{parse_index_file_id, KeyMode, HEADER_SIZE};

/// Index of one namespace
///
/// Records are persisted before they are published in memory, and a
/// record is only written after its data entry was appended.
pub struct IndexStore {
    dir: PathBuf,
    keys: KeyIndex,
    writer: IndexFileWriter,

    /// Sum of live payload lengths
    used_bytes: u64,

    /// Location of the newest data entry reflected in the index
    last_location: Option<Location>,
}

impl IndexStore {
    /// Open the index in `dir` by replaying its index files
    ///
    /// On startup:
    /// 1. Discover existing index files
    /// 2. Replay their records in file order
    /// 3. Truncate a partial record at the end of the newest file, or drop
    ///    the newest file entirely when its header is torn
    /// 4. Open the writer on the index file of the active data file
    pub fn open(
        dir: &Path,
        mode: KeyMode,
        active_file_id: u16,
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(id) = parse_index_file_id(&path) {
                ids.push(id);
            }
        }
        ids.sort_unstable();

        let mut keys = KeyIndex::new(mode);
        let mut used_bytes = 0u64;
        let mut last_location = None;
        let mut records = 0usize;

        for (i, id) in ids.iter().enumerate() {
            let path = super::index_file_path(dir, *id);
            let newest = i + 1 == ids.len();

            // Crashed while creating the file; the writer recreates it and
            // recover_tail refills it from the data files
            if newest && fs::metadata(&path)?.len() < HEADER_SIZE {
                tracing::warn!("Removing index file {} with torn header", path.display());
                fs::remove_file(&path)?;
                continue;
            }

            let contents = read_index_file(&path)?;

            if contents.file_id != *id || contents.mode != mode {
                return Err(ShelfError::InvalidHeader {
                    path,
                    reason: format!(
                        "header names file {} mode {}, expected file {} mode {}",
                        contents.file_id,
                        contents.mode.as_str(),
                        id,
                        mode.as_str()
                    ),
                });
            }

            if contents.valid_len < contents.file_len {
                if !newest {
                    return Err(ShelfError::Storage(format!(
                        "partial record inside sealed index file {}",
                        path.display()
                    )));
                }
                tracing::warn!(
                    "Truncating {} bytes of partial record at end of {}",
                    contents.file_len - contents.valid_len,
                    path.display()
                );
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(contents.valid_len)?;
                file.sync_all()?;
            }

            for entry in contents.entries {
                last_location = Some(entry.location());
                records += 1;
                apply_accounted(&mut keys, &mut used_bytes, entry)?;
            }
        }

        let writer = IndexFileWriter::open(dir, active_file_id, mode, sync_strategy)?;

        tracing::debug!(
            "Loaded index {} ({} records, {} live keys)",
            dir.display(),
            records,
            keys.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            keys,
            writer,
            used_bytes,
            last_location,
        })
    }

    /// Index data entries that were appended but never recorded
    ///
    /// Covers a crash between the data append and the index append.
    pub fn recover_tail(&mut self, data: &DataStore) -> Result<usize> {
        let missing = data.entries_after(self.last_location)?;
        let count = missing.len();

        for (location, header, key) in missing {
            self.record(IndexEntry::from_data(location, &header, key))?;
        }

        if count > 0 {
            tracing::info!(
                "Recovered {} unindexed entries in {}",
                count,
                self.dir.display()
            );
        }
        Ok(count)
    }

    /// Persist a record and publish it, returning the entry it replaced
    pub fn record(&mut self, entry: IndexEntry) -> Result<Option<IndexEntry>> {
        self.keys.check(&entry)?;
        self.writer.append(&self.dir, &entry)?;
        self.last_location = Some(entry.location());
        apply_accounted(&mut self.keys, &mut self.used_bytes, entry)
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.keys.get(key)
    }

    pub fn next_sequential_key(&self) -> Option<u64> {
        self.keys.next_sequential_key()
    }

    pub fn scan_forward(&self, after: Option<&[u8]>) -> Result<&IndexEntry> {
        self.keys.scan_forward(after)
    }

    pub fn scan_backward(&self, before: Option<&[u8]>) -> Result<&IndexEntry> {
        self.keys.scan_backward(before)
    }

    /// Live entries in traversal order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.keys.entries()
    }

    pub fn mode(&self) -> KeyMode {
        self.keys.mode()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sum of live payload lengths in bytes
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sync(&mut self) -> Result<()> {
        self.writer.sync()
    }
}

/// Apply a record to the key index while keeping `used_bytes` in step
///
/// A record the index rejects is not counted.
fn apply_accounted(
    keys: &mut KeyIndex,
    used_bytes: &mut u64,
    entry: IndexEntry,
) -> Result<Option<IndexEntry>> {
    let length = entry.length as u64;
    let deleted = entry.is_deleted();

    let previous = keys.apply(entry)?;
    if let Some(old) = &previous {
        *used_bytes = used_bytes.saturating_sub(old.length as u64);
    }
    if !deleted {
        *used_bytes += length;
    }
    Ok(previous)
}

// =============================================================================
// Rebuild
// =============================================================================

/// Outcome of a rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildSummary {
    /// Index files written
    pub files: u64,
    /// Records written (one per data entry)
    pub records: u64,
    /// Keys live at the end of the replay
    pub live_keys: u64,
}

/// Reconstruct the index files of a namespace from its data files
///
/// Data files are read from id 0 upwards until one is missing. Each one is
/// streamed into an in-memory index file which is committed once the data
/// file is exhausted. A foreign header or a short read fails the rebuild.
pub fn rebuild_from(data_dir: &Path, index_dir: &Path, mode: KeyMode) -> Result<RebuildSummary> {
    let mut summary = RebuildSummary::default();
    let mut keys = KeyIndex::new(mode);
    let mut id: u16 = 0;

    loop {
        let path = data_file_path(data_dir, id);
        if !path.exists() {
            break;
        }

        let mut reader = DataFileReader::open(&path)?;
        if reader.file_id() != id {
            return Err(ShelfError::InvalidHeader {
                path,
                reason: format!("header names file {}, expected {}", reader.file_id(), id),
            });
        }

        let mut builder = IndexFileBuilder::new(id, mode);
        while let Some((location, header, key)) = reader.next_header()? {
            let entry = IndexEntry::from_data(location, &header, key);
            keys.check(&entry)?;
            builder.add(&entry);
            keys.apply(entry)?;
        }

        tracing::debug!("Indexed {} entries from {}", builder.records(), path.display());
        summary.records += builder.records();
        summary.files += 1;
        builder.commit(index_dir)?;

        match id.checked_add(1) {
            Some(next) => id = next,
            None => break,
        }
    }

    summary.live_keys = keys.len() as u64;
    Ok(summary)
}
