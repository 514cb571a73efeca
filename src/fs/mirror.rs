//! Local mirror of the remote directory hierarchy
//!
//! Every discovered directory is recreated under the local root before any
//! transfer starts; transfer tasks rely on their destination folder
//! existing and never create it themselves.

use crate::error::{IoResultExt, Result};
use crate::storage::Entry;
use std::path::PathBuf;
use tracing::debug;

/// Outcome of mirroring a directory set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Directories that did not exist and were created
    pub created: usize,
    /// Directories that were already present
    pub existing: usize,
}

/// Builds the local directory tree for a crawl
#[derive(Debug, Clone)]
pub struct LocalMirrorBuilder {
    local_root: PathBuf,
    remote_root: String,
}

impl LocalMirrorBuilder {
    /// Mirror entries under `remote_root` into `local_root`
    pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
        }
    }

    /// Local destination for a remote entry
    pub fn local_path(&self, entry: &Entry) -> Result<PathBuf> {
        Ok(self.local_root.join(entry.relative_to(&self.remote_root)?))
    }

    /// Create the local root and every directory in `directories`
    ///
    /// Idempotent: directories that already exist are counted, not
    /// recreated, and never cause an error.
    pub fn ensure_local_tree(&self, directories: &[Entry]) -> Result<MirrorStats> {
        let mut stats = MirrorStats::default();

        if self.local_root.is_dir() {
            stats.existing += 1;
        } else {
            std::fs::create_dir_all(&self.local_root).with_path(&self.local_root)?;
            stats.created += 1;
        }

        for dir in directories.iter().filter(|d| d.is_dir()) {
            let target = self.local_path(dir)?;
            if target.is_dir() {
                stats.existing += 1;
                continue;
            }

            debug!("Creating directory: {}", target.display());
            std::fs::create_dir_all(&target).with_path(&target)?;
            stats.created += 1;
        }

        Ok(stats)
    }
}
