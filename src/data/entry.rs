//! Data entry definitions
//!
//! Encoding and decoding of the fixed entry header.

use bytes::{Buf, BufMut, BytesMut};

use super::{Location, ENTRY_HEADER_SIZE, FLAG_DELETED};

/// CRC32-C of a payload, as stored in the integrity field
pub fn payload_crc(payload: &[u8]) -> u32 {
    crc32c::crc32c(payload)
}

/// Fixed-size part of a data entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub key_len: u8,
    pub payload_len: u32,
    pub flags: u8,
    pub timestamp: u64,
    /// CRC32-C of the payload (0 for deletion markers)
    pub integrity: u32,
    /// Previous entry of the same key, `None` at the end of a chain
    pub previous: Option<Location>,
}

impl EntryHeader {
    /// Encode into `buf` (little-endian)
    pub fn encode(&self, buf: &mut BytesMut) {
        let (prev_file, prev_offset) = match self.previous {
            Some(loc) => (loc.file_id, loc.offset),
            None => (0, 0),
        };

        buf.put_u8(self.key_len);
        buf.put_u32_le(self.payload_len);
        buf.put_u8(self.flags);
        buf.put_u64_le(self.timestamp);
        buf.put_u32_le(self.integrity);
        buf.put_u16_le(prev_file);
        buf.put_u64_le(prev_offset);
    }

    /// Decode from exactly `ENTRY_HEADER_SIZE` bytes
    pub fn decode(bytes: &[u8; ENTRY_HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];

        let key_len = buf.get_u8();
        let payload_len = buf.get_u32_le();
        let flags = buf.get_u8();
        let timestamp = buf.get_u64_le();
        let integrity = buf.get_u32_le();
        let prev_file = buf.get_u16_le();
        let prev_offset = buf.get_u64_le();

        let previous = if prev_offset == 0 {
            None
        } else {
            Some(Location::new(prev_file, prev_offset))
        };

        Self {
            key_len,
            payload_len,
            flags,
            timestamp,
            integrity,
            previous,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }

    /// Bytes occupied on disk by header, key and payload
    pub fn entry_size(&self) -> u64 {
        ENTRY_HEADER_SIZE as u64 + self.key_len as u64 + self.payload_len as u64
    }
}

/// A complete entry read back from a data file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub header: EntryHeader,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

impl DataEntry {
    pub fn is_deleted(&self) -> bool {
        self.header.is_deleted()
    }

    /// Whether the stored integrity field matches the payload
    pub fn verify(&self) -> bool {
        if self.is_deleted() {
            return true;
        }
        payload_crc(&self.payload) == self.header.integrity
    }

    /// Encode header, key and payload into one buffer
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.header.entry_size() as usize);
        self.header.encode(&mut buf);
        buf.put_slice(&self.key);
        buf.put_slice(&self.payload);
        buf
    }
}
