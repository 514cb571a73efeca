//! Remote storage module
//!
//! Defines the [`RemoteStore`] capability consumed by the crawler and the
//! download scheduler, the HTTP client for the cloud disk API, and an
//! in-memory store used by tests and benchmarks.

mod disk_api;
mod entry;
mod memory;

pub use disk_api::*;
pub use entry::*;
pub use memory::*;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Authenticated session against a per-user file store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the immediate children of a remote directory
    ///
    /// One call per directory; fails with `OrgDiskError::Listing`.
    async fn list(&self, path: &str) -> Result<Vec<Entry>>;

    /// Copy a single remote file to `local_path`, returning bytes written
    ///
    /// The parent directory of `local_path` must already exist.
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64>;

    /// Account usage, for reporting only
    async fn disk_usage(&self) -> Result<DiskUsage>;

    /// Remove a remote resource, to trash unless `permanently`
    async fn remove(&self, path: &str, permanently: bool) -> Result<()>;

    /// Verify that the session is accepted by the service
    async fn check_session(&self) -> Result<()>;
}
