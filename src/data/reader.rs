//! Data File Reader
//!
//! Streams entries out of a single data file in write order.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::Buf;

use crate::error::{Result, ShelfError};

use super::entry::{DataEntry, EntryHeader};
use super::{Location, ENTRY_HEADER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Sequential reader over one data file
///
/// Used by recovery, index rebuild and the integrity checker.
/// A trailing entry cut short by a crash surfaces as an `UnexpectedEof`
/// I/O error, never as a clean end of file.
pub struct DataFileReader {
    path: PathBuf,
    file_id: u16,
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
}

impl DataFileReader {
    /// Open a data file and validate its header
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let file_id = read_file_header(&mut reader, path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file_id,
            reader,
            position: HEADER_SIZE,
            file_len,
        })
    }

    /// File id recorded in the header
    pub fn file_id(&self) -> u16 {
        self.file_id
    }

    /// Offset of the next entry to be read
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next entry header and key, skipping the payload
    pub fn next_header(&mut self) -> Result<Option<(Location, EntryHeader, Vec<u8>)>> {
        let Some((location, header)) = self.read_entry_header()? else {
            return Ok(None);
        };

        let mut key = vec![0u8; header.key_len as usize];
        self.reader.read_exact(&mut key)?;
        self.reader.seek_relative(header.payload_len as i64)?;
        self.position += header.entry_size();

        Ok(Some((location, header, key)))
    }

    /// Read the next complete entry including its payload
    pub fn next_entry(&mut self) -> Result<Option<(Location, DataEntry)>> {
        let Some((location, header)) = self.read_entry_header()? else {
            return Ok(None);
        };

        let mut key = vec![0u8; header.key_len as usize];
        self.reader.read_exact(&mut key)?;
        let mut payload = vec![0u8; header.payload_len as usize];
        self.reader.read_exact(&mut payload)?;
        self.position += header.entry_size();

        Ok(Some((location, DataEntry { header, key, payload })))
    }

    fn read_entry_header(&mut self) -> Result<Option<(Location, EntryHeader)>> {
        if self.position >= self.file_len {
            return Ok(None);
        }

        let mut raw = [0u8; ENTRY_HEADER_SIZE];
        self.reader.read_exact(&mut raw)?;
        let header = EntryHeader::decode(&raw);

        // Key and payload must fit in what is left of the file
        if self.position + header.entry_size() > self.file_len {
            return Err(ShelfError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry at offset {} of {} extends past end of file",
                    self.position,
                    self.path.display()
                ),
            )));
        }

        Ok(Some((Location::new(self.file_id, self.position), header)))
    }
}

/// Read and validate a data file header, returning its file id
pub(crate) fn read_file_header<R: Read>(reader: &mut R, path: &Path) -> Result<u16> {
    let mut raw = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut raw).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ShelfError::InvalidHeader {
            path: path.to_path_buf(),
            reason: "file shorter than header".to_string(),
        },
        _ => ShelfError::Io(e),
    })?;

    if &raw[0..4] != MAGIC {
        return Err(ShelfError::InvalidHeader {
            path: path.to_path_buf(),
            reason: format!("expected magic DAT0, got {:?}", &raw[0..4]),
        });
    }

    let mut buf = &raw[4..];
    let version = buf.get_u32_le();
    if version != VERSION {
        return Err(ShelfError::InvalidHeader {
            path: path.to_path_buf(),
            reason: format!("unsupported version {}", version),
        });
    }

    Ok(buf.get_u16_le())
}
