//! Remote entry model
//!
//! Entries are produced by [`RemoteStore`](super::RemoteStore) listings and
//! never modified afterwards.

use crate::error::{OrgDiskError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Scheme prefix the disk API puts in front of every resource path
pub const DISK_SCHEME: &str = "disk:";

/// Kind of a remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Directory (may have children)
    Directory,
    /// Regular file
    File,
}

/// A single remote directory or file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Absolute remote path, always starting with `/`
    pub path: String,
    /// Directory or file
    pub kind: EntryKind,
    /// Size in bytes, when the remote reports one
    pub size: Option<u64>,
}

impl Entry {
    /// Create a directory entry
    pub fn directory(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize_remote_path(path.as_ref()),
            kind: EntryKind::Directory,
            size: None,
        }
    }

    /// Create a file entry
    pub fn file(path: impl AsRef<str>, size: Option<u64>) -> Self {
        Self {
            path: normalize_remote_path(path.as_ref()),
            kind: EntryKind::File,
            size,
        }
    }

    /// Is this a directory?
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Last path component
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// Parent remote path (`/` for top-level entries)
    pub fn parent(&self) -> &str {
        match self.path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &self.path[..idx],
        }
    }

    /// Path relative to `root`, as a local relative path
    ///
    /// Rejects entries outside `root` and names that would escape the local
    /// destination (`..`, `.`, empty segments).
    pub fn relative_to(&self, root: &str) -> Result<PathBuf> {
        relative_remote_path(&self.path, root)
    }
}

/// Strip the `disk:` scheme and guarantee a single leading `/`
pub fn normalize_remote_path(path: &str) -> String {
    let path = path.strip_prefix(DISK_SCHEME).unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Map a remote path under `root` to a relative local path
pub fn relative_remote_path(path: &str, root: &str) -> Result<PathBuf> {
    let path = normalize_remote_path(path);
    let root = normalize_remote_path(root);

    let rest = if root == "/" {
        path.as_str()
    } else if path == root {
        ""
    } else {
        path.strip_prefix(&root)
            .filter(|rest| rest.starts_with('/'))
            .ok_or_else(|| {
                OrgDiskError::InvalidPath(format!("'{}' is not under root '{}'", path, root))
            })?
    };

    let mut relative = PathBuf::new();
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Ok(relative);
    }

    for segment in rest.split('/') {
        match Path::new(segment).components().next() {
            Some(Component::Normal(name)) if Path::new(segment).components().count() == 1 => {
                relative.push(name)
            }
            _ => {
                return Err(OrgDiskError::InvalidPath(format!(
                    "unsafe segment '{}' in remote path '{}'",
                    segment, path
                )))
            }
        }
    }

    Ok(relative)
}

/// Account usage as reported by the remote store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Bytes used by the account
    pub used_bytes: u64,
    /// Total quota, if known
    pub total_bytes: Option<u64>,
    /// Bytes held in trash, if known
    pub trash_bytes: Option<u64>,
}

impl DiskUsage {
    /// Used space in whole megabytes, as written to usage reports
    pub fn used_megabytes(&self) -> u64 {
        (self.used_bytes as f64 / (1024.0 * 1024.0)).round() as u64
    }
}
