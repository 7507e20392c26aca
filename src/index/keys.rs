//! In-memory key indexes
//!
//! One variant per addressing mode. Both keep live entries only and
//! expose the same ordered traversal used by SCAN and RSCAN.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, ShelfError};

use super::entry::IndexEntry;
use super::{decode_sequential_key, KeyMode};

// =============================================================================
// UserKey Mode
// =============================================================================

/// Arbitrary byte keys, ordered by last write
///
/// Every upsert moves the key to the end of the traversal order, the
/// same order the records sit in the index files.
#[derive(Debug, Default)]
pub struct UserKeyIndex {
    /// key → (position, entry)
    entries: HashMap<Vec<u8>, (u64, IndexEntry)>,
    /// position → key
    order: BTreeMap<u64, Vec<u8>>,
    next_position: u64,
}

impl UserKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.entries.get(key).map(|(_, entry)| entry)
    }

    pub fn upsert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        let position = self.next_position;
        self.next_position += 1;

        self.order.insert(position, entry.key.clone());
        let previous = self.entries.insert(entry.key.clone(), (position, entry));

        previous.map(|(old_position, old)| {
            self.order.remove(&old_position);
            old
        })
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<IndexEntry> {
        let (position, entry) = self.entries.remove(key)?;
        self.order.remove(&position);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry_at(&self, key: Option<&Vec<u8>>) -> Option<&IndexEntry> {
        key.and_then(|k| self.get(k))
    }

    pub fn first(&self) -> Option<&IndexEntry> {
        self.entry_at(self.order.values().next())
    }

    pub fn last(&self) -> Option<&IndexEntry> {
        self.entry_at(self.order.values().next_back())
    }

    pub fn after(&self, key: &[u8]) -> Result<&IndexEntry> {
        let (position, _) = self.entries.get(key).ok_or(ShelfError::KeyNotFound)?;
        let next = self.order.range(position + 1..).next().map(|(_, k)| k);
        self.entry_at(next).ok_or(ShelfError::KeyNotFound)
    }

    pub fn before(&self, key: &[u8]) -> Result<&IndexEntry> {
        let (position, _) = self.entries.get(key).ok_or(ShelfError::KeyNotFound)?;
        let prev = self.order.range(..*position).next_back().map(|(_, k)| k);
        self.entry_at(prev).ok_or(ShelfError::KeyNotFound)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.order.values().filter_map(move |k| self.get(k))
    }
}

// =============================================================================
// Sequential Mode
// =============================================================================

/// Engine-assigned integer keys
///
/// Ids come from a cursor that only moves forward: a new value takes
/// the cursor, an overwrite keeps its id but still advances the cursor,
/// and deleted ids are never handed out again.
#[derive(Debug, Default)]
pub struct SequentialIndex {
    entries: BTreeMap<u64, IndexEntry>,
    next_id: u64,
}

impl SequentialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next new value will receive
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn get(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.entries.get(&decode_sequential_key(key)?)
    }

    pub fn upsert(&mut self, entry: IndexEntry) -> Result<Option<IndexEntry>> {
        let id = sequential_id(&entry.key)?;

        if id >= self.next_id {
            self.next_id = id + 1;
        } else {
            self.next_id += 1;
        }

        Ok(self.entries.insert(id, entry))
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<IndexEntry> {
        self.entries.remove(&decode_sequential_key(key)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn first(&self) -> Option<&IndexEntry> {
        self.entries.values().next()
    }

    pub fn last(&self) -> Option<&IndexEntry> {
        self.entries.values().next_back()
    }

    pub fn after(&self, key: &[u8]) -> Result<&IndexEntry> {
        let id = self.existing_id(key)?;
        self.entries
            .range(id + 1..)
            .next()
            .map(|(_, e)| e)
            .ok_or(ShelfError::KeyNotFound)
    }

    pub fn before(&self, key: &[u8]) -> Result<&IndexEntry> {
        let id = self.existing_id(key)?;
        self.entries
            .range(..id)
            .next_back()
            .map(|(_, e)| e)
            .ok_or(ShelfError::KeyNotFound)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.values()
    }

    fn existing_id(&self, key: &[u8]) -> Result<u64> {
        decode_sequential_key(key)
            .filter(|id| self.entries.contains_key(id))
            .ok_or(ShelfError::KeyNotFound)
    }
}

/// Id carried by a sequential key; any other length is foreign data
fn sequential_id(key: &[u8]) -> Result<u64> {
    decode_sequential_key(key).ok_or_else(|| {
        ShelfError::Storage(format!(
            "key of {} bytes in a sequential namespace",
            key.len()
        ))
    })
}

// =============================================================================
// Mode-tagged Index
// =============================================================================

/// Key index of one namespace, tagged by addressing mode
#[derive(Debug)]
pub enum KeyIndex {
    UserKey(UserKeyIndex),
    Sequential(SequentialIndex),
}

impl KeyIndex {
    pub fn new(mode: KeyMode) -> Self {
        match mode {
            KeyMode::UserKey => KeyIndex::UserKey(UserKeyIndex::new()),
            KeyMode::Sequential => KeyIndex::Sequential(SequentialIndex::new()),
        }
    }

    pub fn mode(&self) -> KeyMode {
        match self {
            KeyIndex::UserKey(_) => KeyMode::UserKey,
            KeyIndex::Sequential(_) => KeyMode::Sequential,
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&IndexEntry> {
        match self {
            KeyIndex::UserKey(idx) => idx.get(key),
            KeyIndex::Sequential(idx) => idx.get(key),
        }
    }

    /// Refuse a record whose key this index cannot hold
    pub fn check(&self, entry: &IndexEntry) -> Result<()> {
        match self {
            KeyIndex::UserKey(_) => Ok(()),
            KeyIndex::Sequential(_) => sequential_id(&entry.key).map(|_| ()),
        }
    }

    /// Apply one record in write order, returning the entry it replaced
    ///
    /// Deletion markers remove the key; anything else is an upsert. A
    /// rejected record leaves the index untouched.
    pub fn apply(&mut self, entry: IndexEntry) -> Result<Option<IndexEntry>> {
        self.check(&entry)?;
        if entry.is_deleted() {
            return Ok(self.remove(&entry.key));
        }
        match self {
            KeyIndex::UserKey(idx) => Ok(idx.upsert(entry)),
            KeyIndex::Sequential(idx) => idx.upsert(entry),
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<IndexEntry> {
        match self {
            KeyIndex::UserKey(idx) => idx.remove(key),
            KeyIndex::Sequential(idx) => idx.remove(key),
        }
    }

    /// Next key a new sequential value receives; `None` in UserKey mode
    pub fn next_sequential_key(&self) -> Option<u64> {
        match self {
            KeyIndex::UserKey(_) => None,
            KeyIndex::Sequential(idx) => Some(idx.next_id()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            KeyIndex::UserKey(idx) => idx.len(),
            KeyIndex::Sequential(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry following `after`, or the first entry
    pub fn scan_forward(&self, after: Option<&[u8]>) -> Result<&IndexEntry> {
        match (self, after) {
            (KeyIndex::UserKey(idx), None) => idx.first().ok_or(ShelfError::KeyNotFound),
            (KeyIndex::UserKey(idx), Some(key)) => idx.after(key),
            (KeyIndex::Sequential(idx), None) => idx.first().ok_or(ShelfError::KeyNotFound),
            (KeyIndex::Sequential(idx), Some(key)) => idx.after(key),
        }
    }

    /// Entry preceding `before`, or the last entry
    pub fn scan_backward(&self, before: Option<&[u8]>) -> Result<&IndexEntry> {
        match (self, before) {
            (KeyIndex::UserKey(idx), None) => idx.last().ok_or(ShelfError::KeyNotFound),
            (KeyIndex::UserKey(idx), Some(key)) => idx.before(key),
            (KeyIndex::Sequential(idx), None) => idx.last().ok_or(ShelfError::KeyNotFound),
            (KeyIndex::Sequential(idx), Some(key)) => idx.before(key),
        }
    }

    /// Live entries in traversal order
    pub fn entries(&self) -> Box<dyn Iterator<Item = &IndexEntry> + '_> {
        match self {
            KeyIndex::UserKey(idx) => Box::new(idx.iter()),
            KeyIndex::Sequential(idx) => Box::new(idx.iter()),
        }
    }
}
