//! Protocol Module
//!
//! Redis-compatible (RESP) framing and the command surface.
//!
//! ### Request Format
//! ```text
//! *3\r\n$3\r\nSET\r\n$5\r\nhello\r\n$5\r\nworld\r\n
//! ```
//!
//! ### Commands
//! - Keys: PING, SET, GET, DEL, EXISTS, CHECK, SCAN, RSCAN, HISTORY
//! - Namespaces: NSNEW, NSDEL, NSSET, NSINFO, NSLIST, SELECT, RELOAD
//! - Server: AUTH, WAIT, DBSIZE, INFO, TIME, STOP
//!
//! ### Reply Types
//! - `+` status, `-` error, `:` integer, `$` bulk (or `$-1` nil), `*` array

mod codec;
mod command;
mod reply;

pub use codec::{
    encode_request, read_reply, read_request, write_reply, write_request, MAX_ARGUMENTS,
    MAX_ARGUMENT_SIZE,
};
pub use command::Command;
pub use reply::Reply;
