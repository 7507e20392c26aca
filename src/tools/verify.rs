//! Integrity check
//!
//! Streams one data file and recomputes each payload's CRC32-C.
//! Needs no index.

use std::path::Path;

use crate::data::{DataFileReader, FILE_PREFIX};
use crate::error::{Result, ShelfError};

/// Outcome of an integrity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyReport {
    pub file_id: u16,
    /// Entries read, deletion markers included
    pub entries: u64,
    /// Entries whose payload no longer matches its CRC32-C
    pub errors: u64,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Check every entry of the data file at `path`
pub fn verify(path: &Path) -> Result<VerifyReport> {
    let is_data_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with(FILE_PREFIX));
    if !is_data_file {
        return Err(ShelfError::InvalidName(format!(
            "{} is not a {}NNNNN file",
            path.display(),
            FILE_PREFIX
        )));
    }

    let mut reader = DataFileReader::open(path)?;
    let mut report = VerifyReport {
        file_id: reader.file_id(),
        ..VerifyReport::default()
    };

    while let Some((location, entry)) = reader.next_entry()? {
        report.entries += 1;

        // Deletion markers carry no payload to check
        if entry.is_deleted() || entry.header.payload_len == 0 {
            continue;
        }

        if !entry.verify() {
            report.errors += 1;
            tracing::warn!(
                "CRC mismatch at offset {} (key {:?}, {} bytes)",
                location.offset,
                String::from_utf8_lossy(&entry.key),
                entry.header.payload_len
            );
        }
    }

    Ok(report)
}
