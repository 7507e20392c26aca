//! Tests for DataFileReader
//!
//! These tests verify:
//! - Entries stream back in write order with correct locations
//! - Header-only iteration skips payloads
//! - Invalid headers are rejected
//! - A truncated tail is reported as UnexpectedEof

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use shelfdb::config::SyncStrategy;
use shelfdb::data::{data_file_path, DataFileReader, DataStore, Location, HEADER_SIZE};
use shelfdb::ShelfError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Write `count` entries through a DataStore and return the file path
fn write_entries(temp: &TempDir, count: usize) -> (PathBuf, Vec<Location>) {
    let mut store = DataStore::open(temp.path(), 1024 * 1024, SyncStrategy::EveryWrite).unwrap();
    let mut locations = Vec::new();
    for i in 0..count {
        let key = format!("key{}", i);
        let value = format!("value{}", i);
        locations.push(store.append(key.as_bytes(), value.as_bytes(), None, i as u64).unwrap());
    }
    (data_file_path(temp.path(), 0), locations)
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_read_empty_file() {
    let temp = TempDir::new().unwrap();
    let (path, _) = write_entries(&temp, 0);

    let mut reader = DataFileReader::open(&path).unwrap();
    assert_eq!(reader.file_id(), 0);
    assert_eq!(reader.position(), HEADER_SIZE);
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_read_entries_in_order() {
    let temp = TempDir::new().unwrap();
    let (path, locations) = write_entries(&temp, 5);

    let mut reader = DataFileReader::open(&path).unwrap();
    let mut seen = Vec::new();
    while let Some((loc, entry)) = reader.next_entry().unwrap() {
        assert!(entry.verify());
        seen.push((loc, entry.key, entry.payload));
    }

    assert_eq!(seen.len(), 5);
    for (i, (loc, key, payload)) in seen.into_iter().enumerate() {
        assert_eq!(loc, locations[i]);
        assert_eq!(key, format!("key{}", i).into_bytes());
        assert_eq!(payload, format!("value{}", i).into_bytes());
    }
}

#[test]
fn test_next_header_skips_payload() {
    let temp = TempDir::new().unwrap();
    let (path, locations) = write_entries(&temp, 3);

    let mut reader = DataFileReader::open(&path).unwrap();
    let mut count = 0;
    while let Some((loc, header, key)) = reader.next_header().unwrap() {
        assert_eq!(loc, locations[count]);
        assert_eq!(header.payload_len as usize, format!("value{}", count).len());
        assert_eq!(key, format!("key{}", count).into_bytes());
        count += 1;
    }

    assert_eq!(count, 3);
    assert_eq!(reader.position(), fs::metadata(&path).unwrap().len());
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_bad_magic_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("zdb-data-00000");
    fs::write(&path, b"IDX0\x01\x00\x00\x00\x00\x00").unwrap();

    assert!(matches!(
        DataFileReader::open(&path),
        Err(ShelfError::InvalidHeader { .. })
    ));
}

#[test]
fn test_bad_version_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("zdb-data-00000");
    fs::write(&path, b"DAT0\x07\x00\x00\x00\x00\x00").unwrap();

    assert!(matches!(
        DataFileReader::open(&path),
        Err(ShelfError::InvalidHeader { .. })
    ));
}

#[test]
fn test_short_file_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("zdb-data-00000");
    fs::write(&path, b"DAT").unwrap();

    assert!(matches!(
        DataFileReader::open(&path),
        Err(ShelfError::InvalidHeader { .. })
    ));
}

#[test]
fn test_truncated_tail_is_unexpected_eof() {
    let temp = TempDir::new().unwrap();
    let (path, _) = write_entries(&temp, 2);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    drop(file);

    let mut reader = DataFileReader::open(&path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_some());

    match reader.next_entry() {
        Err(ShelfError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("expected UnexpectedEof, got {:?}", other.map(|o| o.map(|(l, _)| l))),
    }
}
