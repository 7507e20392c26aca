//! Namespace Module
//!
//! Isolated keyspaces, each with its own addressing mode, quota,
//! visibility and password.
//!
//! ## Responsibilities
//! - Bind one Index Store and one Data Store per namespace
//! - Quota admission and no-op detection on SET
//! - Persist settings in a descriptor next to the index files
//! - Track outstanding handles so deletion can be refused
//! - WAIT notifications between sessions
//!
//! ## On-disk Layout
//! ```text
//! {data_dir}/{name}/zdb-data-00000 ...
//! {index_dir}/{name}/zdb-namespace
//! {index_dir}/{name}/zdb-index-00000 ...
//! ```

pub mod descriptor;
mod handle;
mod manager;
mod watch;

pub use descriptor::NamespaceSettings;
pub use handle::{HistoryItem, Namespace, NamespaceHandle, NamespaceInfo, SetOutcome};
pub use manager::{
    validate_name, NamespaceManager, Property, CLEAR_PASSWORD, DEFAULT_NAMESPACE, MAX_NAME_LEN,
    MAX_PASSWORD_LEN, MAX_PROPERTY_VALUE_LEN,
};
pub use watch::{Subscription, Watchers, ANY_COMMAND};
