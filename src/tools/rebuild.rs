//! Index rebuild
//!
//! Recreates `index_dir/<namespace>` from `data_dir/<namespace>` alone.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ShelfError};
use crate::index::{rebuild_from, KeyMode, RebuildSummary};
use crate::namespace::{descriptor, validate_name, NamespaceSettings};

/// Options for [`rebuild`]
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Addressing mode the data files were written in
    pub mode: KeyMode,
    /// Descriptor file whose settings (visibility, password, quota) are
    /// copied into the rebuilt namespace
    pub template: Option<PathBuf>,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            mode: KeyMode::UserKey,
            template: None,
        }
    }
}

/// Outcome of a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub index_dir: PathBuf,
    pub summary: RebuildSummary,
}

/// Rebuild the index of `namespace`
///
/// The target index directory must not exist yet, so a possibly valid
/// index is never overwritten. The data directory must exist.
pub fn rebuild(
    data_root: &Path,
    index_root: &Path,
    namespace: &str,
    options: &RebuildOptions,
) -> Result<RebuildReport> {
    validate_name(namespace)?;

    let data_dir = data_root.join(namespace);
    let index_dir = index_root.join(namespace);

    if !data_dir.is_dir() {
        return Err(ShelfError::NamespaceNotFound(format!(
            "{} is not a directory",
            data_dir.display()
        )));
    }
    if index_dir.exists() {
        return Err(ShelfError::AlreadyExists(format!(
            "{} already exists",
            index_dir.display()
        )));
    }

    let mut settings = match &options.template {
        Some(path) => descriptor::load_file(path)?,
        None => NamespaceSettings::new(options.mode),
    };
    settings.mode = options.mode;

    fs::create_dir_all(&index_dir)?;

    tracing::info!(
        "Rebuilding index of '{}' from {} ({} mode)",
        namespace,
        data_dir.display(),
        options.mode.as_str()
    );

    let summary = rebuild_from(&data_dir, &index_dir, options.mode)?;
    descriptor::store(&index_dir, &settings)?;

    tracing::info!(
        "Rebuilt {} index file(s), {} record(s), {} live key(s)",
        summary.files,
        summary.records,
        summary.live_keys
    );

    Ok(RebuildReport { index_dir, summary })
}
