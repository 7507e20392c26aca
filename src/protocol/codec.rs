//! Protocol codec
//!
//! RESP framing for requests and replies.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n     (argc times)
//! ```
//!
//! ### Reply
//! ```text
//! +status\r\n | -error\r\n | :integer\r\n | $len\r\nbytes\r\n | $-1\r\n | *n\r\n...
//! ```
//!
//! Every framing error here is unrecoverable for the connection: the
//! reader no longer knows where the next request starts.

use std::io::{self, BufRead, Read, Write};

use bytes::{BufMut, BytesMut};

use crate::error::{Result, ShelfError};

use super::Reply;

/// Maximum number of arguments in one request
pub const MAX_ARGUMENTS: usize = 16;

/// Maximum size of a single argument (8 MB)
pub const MAX_ARGUMENT_SIZE: usize = 8 * 1024 * 1024;

/// Longest `*n` / `$n` / `:n` header line accepted
const MAX_LINE: u64 = 64;

/// Longest `+status` / `-error` line accepted in a reply
const MAX_TEXT_LINE: u64 = MAX_ARGUMENT_SIZE as u64;

// =============================================================================
// Requests
// =============================================================================

/// Read one request and return its argument vector
///
/// A clean end of stream before the first byte surfaces as an
/// `UnexpectedEof` I/O error.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Vec<Vec<u8>>> {
    let line = read_line(reader, MAX_LINE)?;

    let count = match line.split_first() {
        Some((b'*', rest)) => parse_len(rest)?,
        _ => {
            return Err(ShelfError::Protocol(
                "expected a RESP array request".to_string(),
            ))
        }
    };

    if count == 0 || count > MAX_ARGUMENTS {
        return Err(ShelfError::Protocol(format!(
            "argument count {} outside 1..={}",
            count, MAX_ARGUMENTS
        )));
    }

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let line = read_line(reader, MAX_LINE)?;
        let len = match line.split_first() {
            Some((b'$', rest)) => parse_len(rest)?,
            _ => return Err(ShelfError::Protocol("expected a bulk string".to_string())),
        };

        if len > MAX_ARGUMENT_SIZE {
            return Err(ShelfError::Protocol(format!(
                "argument of {} bytes exceeds {}",
                len, MAX_ARGUMENT_SIZE
            )));
        }

        let mut arg = vec![0u8; len + 2];
        reader.read_exact(&mut arg)?;
        if !arg.ends_with(b"\r\n") {
            return Err(ShelfError::Protocol("bulk string not terminated".to_string()));
        }
        arg.truncate(len);
        args.push(arg);
    }

    Ok(args)
}

/// Encode a request (client side)
pub fn encode_request(args: &[&[u8]]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
    buf
}

/// Write a request to a stream (client side)
pub fn write_request<W: Write>(writer: &mut W, args: &[&[u8]]) -> Result<()> {
    writer.write_all(&encode_request(args))?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Replies
// =============================================================================

/// Write a reply to a stream
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    let mut buf = BytesMut::new();
    reply.encode(&mut buf);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Read one reply from a stream (client side)
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    // Status and error lines carry free text, everything else a number
    let limit = match reader.fill_buf()?.first() {
        Some(b'+') | Some(b'-') => MAX_TEXT_LINE,
        _ => MAX_LINE,
    };
    let line = read_line(reader, limit)?;
    let (kind, rest) = line
        .split_first()
        .ok_or_else(|| ShelfError::Protocol("empty reply line".to_string()))?;

    let reply = match kind {
        b'+' => Reply::Status(String::from_utf8_lossy(rest).into_owned()),
        b'-' => Reply::Error(String::from_utf8_lossy(rest).into_owned()),
        b':' => {
            let n = std::str::from_utf8(rest)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ShelfError::Protocol("invalid integer reply".to_string()))?;
            Reply::Integer(n)
        }
        b'$' if rest == b"-1" => Reply::Nil,
        b'$' => {
            let len = parse_len(rest)?;
            let mut bytes = vec![0u8; len + 2];
            reader.read_exact(&mut bytes)?;
            bytes.truncate(len);
            Reply::Bulk(bytes)
        }
        b'*' => {
            let count = parse_len(rest)?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_reply(reader)?);
            }
            Reply::Array(items)
        }
        other => {
            return Err(ShelfError::Protocol(format!(
                "unknown reply type byte 0x{:02x}",
                other
            )))
        }
    };

    Ok(reply)
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Read a CRLF-terminated line of at most `limit` bytes, without the terminator
fn read_line<R: BufRead>(reader: &mut R, limit: u64) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut line)?;

    if read == 0 {
        return Err(ShelfError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(ShelfError::Protocol("line too long or not CRLF terminated".to_string()));
    }

    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_len(digits: &[u8]) -> Result<usize> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ShelfError::Protocol("invalid length".to_string()))
}
