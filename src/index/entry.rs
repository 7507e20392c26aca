//! Index entry definitions

use bytes::{Buf, BufMut, BytesMut};

use crate::data::{EntryHeader, Location, FLAG_DELETED};

use super::RECORD_HEADER_SIZE;

/// Locator for one data entry
///
/// Holds no payload bytes; everything here is derivable from the
/// data entry it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub data_file_id: u16,
    pub offset: u64,
    /// Payload length
    pub length: u32,
    pub flags: u8,
    pub timestamp: u64,
    /// CRC32-C of the payload, copied from the data entry
    pub integrity: u32,
}

impl IndexEntry {
    /// Build the index record for a data entry written at `location`
    pub fn from_data(location: Location, header: &EntryHeader, key: Vec<u8>) -> Self {
        Self {
            key,
            data_file_id: location.file_id,
            offset: location.offset,
            length: header.payload_len,
            flags: header.flags,
            timestamp: header.timestamp,
            integrity: header.integrity,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.data_file_id, self.offset)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }

    /// Encode as an on-disk record
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(RECORD_HEADER_SIZE + self.key.len());
        buf.put_u8(self.key.len() as u8);
        buf.put_u16_le(self.data_file_id);
        buf.put_u64_le(self.offset);
        buf.put_u32_le(self.length);
        buf.put_u8(self.flags);
        buf.put_u64_le(self.timestamp);
        buf.put_u32_le(self.integrity);
        buf.put_slice(&self.key);
    }

    /// Decode one record from the front of `bytes`
    ///
    /// Returns the entry and the number of bytes consumed, or `None`
    /// when `bytes` holds less than a full record.
    pub fn decode(bytes: &[u8]) -> Option<(Self, usize)> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return None;
        }

        let mut buf = bytes;
        let key_len = buf.get_u8() as usize;
        let data_file_id = buf.get_u16_le();
        let offset = buf.get_u64_le();
        let length = buf.get_u32_le();
        let flags = buf.get_u8();
        let timestamp = buf.get_u64_le();
        let integrity = buf.get_u32_le();

        if buf.len() < key_len {
            return None;
        }
        let key = buf[..key_len].to_vec();

        Some((
            Self {
                key,
                data_file_id,
                offset,
                length,
                flags,
                timestamp,
                integrity,
            },
            RECORD_HEADER_SIZE + key_len,
        ))
    }
}
