//! Data Store
//!
//! Owns the data files of one namespace: appends to the active file,
//! random reads by location, and history chain traversal.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::{Result, ShelfError};

use super::entry::{payload_crc, DataEntry, EntryHeader};
use super::reader::DataFileReader;
use super::{
    data_file_path, parse_data_file_id, Location, ENTRY_HEADER_SIZE, FLAG_DELETED, HEADER_SIZE,
    MAGIC, MAX_KEY_LEN, VERSION,
};

/// Append-only store for one namespace
///
/// ## Concurrency:
/// - Appends take `&mut self`; the owning namespace serializes them
/// - Reads take `&self` and share a cache of read handles behind a Mutex
pub struct DataStore {
    /// Directory holding `zdb-data-NNNNN` files
    dir: PathBuf,

    /// Rotation bound for the active file
    max_file_size: u64,

    sync_strategy: SyncStrategy,

    /// Append handle of the active (highest id) file
    active: File,
    active_id: u16,
    active_size: u64,
    last_sync: Instant,

    /// Read handles, one per file id
    readers: Mutex<HashMap<u16, File>>,
}

impl DataStore {
    /// Open or create the data files in `dir`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing data files
    /// 3. Validate the active file and truncate a partially written tail
    /// 4. Create file 0 if the directory was empty
    pub fn open(dir: &Path, max_file_size: u64, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let ids = list_file_ids(dir)?;
        let active_id = ids.last().copied().unwrap_or(0);
        let path = data_file_path(dir, active_id);

        let (active, active_size) = if path.exists() {
            recover_active_file(&path, active_id)?
        } else {
            (create_data_file(&path, active_id)?, HEADER_SIZE)
        };

        tracing::debug!(
            "Opened data store {} (active file {}, {} bytes)",
            dir.display(),
            active_id,
            active_size
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            max_file_size,
            sync_strategy,
            active,
            active_id,
            active_size,
            last_sync: Instant::now(),
            readers: Mutex::new(HashMap::new()),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a value for `key`, linking it to `previous`
    pub fn append(
        &mut self,
        key: &[u8],
        payload: &[u8],
        previous: Option<Location>,
        timestamp: u64,
    ) -> Result<Location> {
        let entry = DataEntry {
            header: EntryHeader {
                key_len: checked_key_len(key)?,
                payload_len: checked_payload_len(payload)?,
                flags: 0,
                timestamp,
                integrity: payload_crc(payload),
                previous,
            },
            key: key.to_vec(),
            payload: payload.to_vec(),
        };

        self.write_entry(&entry)
    }

    /// Append a deletion marker for `key`
    pub fn append_tombstone(
        &mut self,
        key: &[u8],
        previous: Option<Location>,
        timestamp: u64,
    ) -> Result<Location> {
        let entry = DataEntry {
            header: EntryHeader {
                key_len: checked_key_len(key)?,
                payload_len: 0,
                flags: FLAG_DELETED,
                timestamp,
                integrity: 0,
                previous,
            },
            key: key.to_vec(),
            payload: Vec::new(),
        };

        self.write_entry(&entry)
    }

    fn write_entry(&mut self, entry: &DataEntry) -> Result<Location> {
        let size = entry.header.entry_size();

        // A single oversized entry still goes into an otherwise empty file
        if self.active_size + size > self.max_file_size && self.active_size > HEADER_SIZE {
            self.rotate()?;
        }

        let offset = self.active_size;
        let bytes = entry.encode();

        if let Err(e) = self.active.write_all(&bytes) {
            // Drop whatever part of the entry reached the file
            if let Err(trunc) = self.active.set_len(offset) {
                tracing::error!(
                    "Failed to roll back partial write in data file {}: {}",
                    self.active_id,
                    trunc
                );
            }
            return Err(e.into());
        }

        self.active_size += size;

        if self.sync_strategy.is_due(self.last_sync) {
            self.active.sync_data()?;
            self.last_sync = Instant::now();
        }

        Ok(Location::new(self.active_id, offset))
    }

    /// Take back the entry just appended at `location`
    ///
    /// Used when the index record for that entry could not be written, so
    /// the entry does not resurface through index recovery on reopen.
    pub fn discard_last(&mut self, location: Location) -> Result<()> {
        let not_tail = || {
            ShelfError::Storage(format!(
                "entry at {}:{} is not the tail of the active data file",
                location.file_id, location.offset
            ))
        };

        if location.file_id != self.active_id || location.offset >= self.active_size {
            return Err(not_tail());
        }
        let size = self.read_unverified(location)?.header.entry_size();
        if location.offset + size != self.active_size {
            return Err(not_tail());
        }

        self.active.set_len(location.offset)?;
        self.active.sync_all()?;
        self.active_size = location.offset;

        tracing::warn!(
            "Discarded unindexed entry at {}:{} in {}",
            location.file_id,
            location.offset,
            self.dir.display()
        );
        Ok(())
    }

    /// Seal the active file and start the next one
    fn rotate(&mut self) -> Result<()> {
        let next_id = self.active_id.checked_add(1).ok_or_else(|| {
            ShelfError::Storage(format!("data file ids exhausted in {}", self.dir.display()))
        })?;

        self.active.sync_all()?;

        let path = data_file_path(&self.dir, next_id);
        self.active = create_data_file(&path, next_id)?;
        self.active_id = next_id;
        self.active_size = HEADER_SIZE;
        self.last_sync = Instant::now();

        tracing::info!("Rotated data file in {} to {}", self.dir.display(), next_id);
        Ok(())
    }

    /// Flush the active file to disk
    pub fn sync(&mut self) -> Result<()> {
        self.active.sync_all()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the entry at `location`, verifying its CRC32-C
    pub fn read(&self, location: Location) -> Result<DataEntry> {
        let entry = self.read_unverified(location)?;
        if !entry.verify() {
            tracing::warn!(
                "CRC mismatch in data file {} at offset {}",
                location.file_id,
                location.offset
            );
            return Err(ShelfError::CorruptEntry {
                file_id: location.file_id,
                offset: location.offset,
            });
        }
        Ok(entry)
    }

    /// Whether the entry at `location` still matches its stored CRC32-C
    pub fn check(&self, location: Location) -> Result<bool> {
        Ok(self.read_unverified(location)?.verify())
    }

    /// Read the entry at `location` without checking its integrity field
    pub fn read_unverified(&self, location: Location) -> Result<DataEntry> {
        if location.offset < HEADER_SIZE {
            return Err(ShelfError::CorruptEntry {
                file_id: location.file_id,
                offset: location.offset,
            });
        }

        let mut readers = self.readers.lock();
        let file = match readers.entry(location.file_id) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let path = data_file_path(&self.dir, location.file_id);
                e.insert(File::open(path)?)
            }
        };

        file.seek(SeekFrom::Start(location.offset))?;

        let mut raw = [0u8; ENTRY_HEADER_SIZE];
        file.read_exact(&mut raw)?;
        let header = EntryHeader::decode(&raw);

        let mut key = vec![0u8; header.key_len as usize];
        file.read_exact(&mut key)?;
        let mut payload = vec![0u8; header.payload_len as usize];
        file.read_exact(&mut payload)?;

        Ok(DataEntry { header, key, payload })
    }

    /// Walk the history chain starting at `start`, newest first
    pub fn history(&self, start: Location) -> History<'_> {
        History {
            store: self,
            next: Some(start),
        }
    }

    /// Entry headers written after `after` (or all of them), in write order
    ///
    /// Used to replay entries that reached the data files but not the index.
    pub fn entries_after(
        &self,
        after: Option<Location>,
    ) -> Result<Vec<(Location, EntryHeader, Vec<u8>)>> {
        let mut found = Vec::new();
        let first_id = after.map(|loc| loc.file_id).unwrap_or(0);

        for id in list_file_ids(&self.dir)? {
            if id < first_id {
                continue;
            }

            let mut reader = DataFileReader::open(&data_file_path(&self.dir, id))?;
            while let Some((location, header, key)) = reader.next_header()? {
                if after.map_or(true, |a| location > a) {
                    found.push((location, header, key));
                }
            }
        }

        Ok(found)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Id of the file currently receiving appends
    pub fn active_file_id(&self) -> u16 {
        self.active_id
    }

    /// Size of the active file in bytes
    pub fn active_size(&self) -> u64 {
        self.active_size
    }

    /// Ids of all data files, ascending
    pub fn file_ids(&self) -> Result<Vec<u16>> {
        list_file_ids(&self.dir)
    }
}

// =============================================================================
// History Chain
// =============================================================================

/// Lazy walk over a history chain
///
/// Yields `(location, entry)` pairs until the chain sentinel. Every link
/// must point strictly backwards; anything else is reported as corruption.
pub struct History<'a> {
    store: &'a DataStore,
    next: Option<Location>,
}

impl Iterator for History<'_> {
    type Item = Result<(Location, DataEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        let location = self.next.take()?;

        match self.store.read(location) {
            Ok(entry) => {
                match entry.header.previous {
                    Some(prev) if prev >= location => {
                        return Some(Err(ShelfError::CorruptEntry {
                            file_id: location.file_id,
                            offset: location.offset,
                        }));
                    }
                    prev => self.next = prev,
                }
                Some(Ok((location, entry)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Ids of the data files present in `dir`, ascending
fn list_file_ids(dir: &Path) -> Result<Vec<u16>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(id) = parse_data_file_id(&path) {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Create a new data file with its header
fn create_data_file(path: &Path, id: u16) -> Result<File> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .append(true)
        .open(path)?;

    let mut header = BytesMut::with_capacity(HEADER_SIZE as usize);
    header.put_slice(MAGIC);
    header.put_u32_le(VERSION);
    header.put_u16_le(id);

    file.write_all(&header)?;
    file.sync_all()?;

    Ok(file)
}

/// Validate the active file and cut off a partially written trailing entry
fn recover_active_file(path: &Path, id: u16) -> Result<(File, u64)> {
    let file_len = fs::metadata(path)?.len();

    if file_len < HEADER_SIZE {
        // Crashed while creating the file: nothing but a torn header
        tracing::warn!("Recreating data file {} with torn header", path.display());
        fs::remove_file(path)?;
        return Ok((create_data_file(path, id)?, HEADER_SIZE));
    }

    let mut reader = DataFileReader::open(path)?;
    if reader.file_id() != id {
        return Err(ShelfError::InvalidHeader {
            path: path.to_path_buf(),
            reason: format!("header names file {}, expected {}", reader.file_id(), id),
        });
    }

    let valid_len = loop {
        match reader.next_header() {
            Ok(Some(_)) => {}
            Ok(None) => break reader.position(),
            Err(ShelfError::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                break reader.position();
            }
            Err(e) => return Err(e),
        }
    };

    let file = OpenOptions::new().read(true).append(true).open(path)?;
    if valid_len < file_len {
        tracing::warn!(
            "Truncating {} bytes of partial entry at end of {}",
            file_len - valid_len,
            path.display()
        );
        file.set_len(valid_len)?;
        file.sync_all()?;
    }

    Ok((file, valid_len))
}

fn checked_key_len(key: &[u8]) -> Result<u8> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(ShelfError::InvalidValue(format!(
            "key length {} outside 1..={}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(key.len() as u8)
}

fn checked_payload_len(payload: &[u8]) -> Result<u32> {
    u32::try_from(payload.len())
        .map_err(|_| ShelfError::InvalidValue(format!("payload of {} bytes", payload.len())))
}
