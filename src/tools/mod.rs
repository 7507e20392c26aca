//! Offline Tools
//!
//! Operator utilities that work on files directly, with no server running:
//! - `rebuild`: reconstruct a namespace's index from its data files
//! - `verify`: recompute the CRC32-C of every entry in one data file

mod rebuild;
mod verify;

pub use rebuild::{rebuild, RebuildOptions, RebuildReport};
pub use verify::{verify, VerifyReport};
