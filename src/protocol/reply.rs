//! Reply definitions
//!
//! Represents replies to clients, framed as RESP values.

use bytes::{BufMut, BytesMut};

/// A reply to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+text`
    Status(String),
    /// `-text`
    Error(String),
    /// `:n`
    Integer(i64),
    /// `$len` followed by the bytes
    Bulk(Vec<u8>),
    /// `$-1`
    Nil,
    /// `*n` followed by n replies
    Array(Vec<Reply>),
}

impl Reply {
    /// `+OK`
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(bytes.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Append the RESP encoding of this reply to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(text) => {
                buf.put_u8(b'+');
                put_line(buf, text.as_bytes());
            }
            Reply::Error(text) => {
                buf.put_u8(b'-');
                put_line(buf, text.as_bytes());
            }
            Reply::Integer(n) => {
                buf.put_u8(b':');
                put_line(buf, n.to_string().as_bytes());
            }
            Reply::Bulk(bytes) => {
                buf.put_u8(b'$');
                put_line(buf, bytes.len().to_string().as_bytes());
                buf.put_slice(bytes);
                buf.put_slice(b"\r\n");
            }
            Reply::Nil => buf.put_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                buf.put_u8(b'*');
                put_line(buf, items.len().to_string().as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }
}

/// Status and error lines must stay on one line
fn put_line(buf: &mut BytesMut, text: &[u8]) {
    for &b in text {
        buf.put_u8(if b == b'\r' || b == b'\n' { b' ' } else { b });
    }
    buf.put_slice(b"\r\n");
}
