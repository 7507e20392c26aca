//! # shelfdb
//!
//! A single-node key-value store speaking the Redis wire protocol:
//! - Isolated namespaces with their own quota, password and addressing mode
//! - Append-only data files with CRC32-C and per-key history chains
//! - Index files rebuildable from the data files alone
//! - Offline index rebuild and integrity check tools
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │              (one Session per connection)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Namespace Manager                          │
//! │          (selection, ACL, quota, lifecycle)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  one pair per namespace
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Index Store │ ───────▶ │ Data Store  │
//!   │ (locators)  │          │ (append-only│
//!   └─────────────┘          │   log)      │
//!                            └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod data;
pub mod index;
pub mod namespace;
pub mod tools;
pub mod protocol;
pub mod engine;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, SyncStrategy};
pub use engine::{Engine, Session};
pub use error::{Result, ShelfError};
pub use index::KeyMode;
pub use namespace::{NamespaceHandle, NamespaceManager};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of shelfdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
