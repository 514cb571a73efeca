//! In-memory remote store
//!
//! Holds a tree of directories and file contents and serves it through the
//! [`RemoteStore`] trait. Records every listing call and the peak number of
//! concurrent downloads, and can be told to fail specific paths or refuse
//! them as an expired session would.

use super::{normalize_remote_path, DiskUsage, Entry, RemoteStore};
use crate::error::{IoResultExt, OrgDiskError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Remote store backed by in-process maps
#[derive(Debug, Default)]
pub struct MemoryStore {
    directories: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    failing_listings: HashSet<String>,
    revoked_listings: HashSet<String>,
    failing_downloads: HashSet<String>,
    download_latency: Duration,
    listing_log: Mutex<Vec<String>>,
    removed: Mutex<Vec<(String, bool)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    downloads_started: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store containing only the root directory
    pub fn new() -> Self {
        let mut store = Self::default();
        store.directories.insert("/".to_string());
        store
    }

    /// Add a directory (and any missing ancestors)
    pub fn with_dir(mut self, path: &str) -> Self {
        self.insert_dir(&normalize_remote_path(path));
        self
    }

    /// Add a file with the given contents (ancestors are created)
    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let path = normalize_remote_path(path);
        let parent = Entry::file(&path, None).parent().to_string();
        self.insert_dir(&parent);
        self.files.insert(path, contents.into());
        self
    }

    /// Make listing `path` fail
    pub fn failing_listing(mut self, path: &str) -> Self {
        self.failing_listings.insert(normalize_remote_path(path));
        self
    }

    /// Make listing `path` fail as if the session had expired
    pub fn revoked_listing(mut self, path: &str) -> Self {
        self.revoked_listings.insert(normalize_remote_path(path));
        self
    }

    /// Make downloading `path` fail
    pub fn failing_download(mut self, path: &str) -> Self {
        self.failing_downloads.insert(normalize_remote_path(path));
        self
    }

    /// Delay every download by `latency`
    pub fn with_download_latency(mut self, latency: Duration) -> Self {
        self.download_latency = latency;
        self
    }

    fn insert_dir(&mut self, path: &str) {
        let mut current = String::new();
        self.directories.insert("/".to_string());
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.directories.insert(current.clone());
        }
    }

    /// Number of listing calls served so far
    pub fn listing_calls(&self) -> usize {
        self.listing_log.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// Paths listed, in call order
    pub fn listing_order(&self) -> Vec<String> {
        self.listing_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Highest number of downloads observed running at once
    pub fn peak_concurrent_downloads(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Number of downloads that reached the store
    pub fn downloads_started(&self) -> usize {
        self.downloads_started.load(Ordering::SeqCst)
    }

    /// Paths removed so far, with their `permanently` flag
    pub fn removed(&self) -> Vec<(String, bool)> {
        self.removed.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Total bytes of all stored files
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|f| f.len() as u64).sum()
    }

    fn children(&self, path: &str) -> Vec<Entry> {
        let is_child = |candidate: &str| {
            candidate != path && Entry::directory(candidate).parent() == path
        };

        let mut entries: Vec<Entry> = self
            .directories
            .iter()
            .filter(|d| is_child(d))
            .map(Entry::directory)
            .collect();

        entries.extend(
            self.files
                .iter()
                .filter(|(f, _)| is_child(f))
                .map(|(f, data)| Entry::file(f, Some(data.len() as u64))),
        );

        entries
    }
}

/// Decrements the in-flight counter on every exit path
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, path: &str) -> Result<Vec<Entry>> {
        let path = normalize_remote_path(path);

        if let Ok(mut log) = self.listing_log.lock() {
            log.push(path.clone());
        }

        if self.revoked_listings.contains(&path) {
            return Err(OrgDiskError::auth("disk session", "401 token expired"));
        }
        if self.failing_listings.contains(&path) {
            return Err(OrgDiskError::listing(&path, "injected listing failure"));
        }
        if !self.directories.contains(&path) {
            return Err(OrgDiskError::listing(&path, "no such directory"));
        }

        Ok(self.children(&path))
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let remote_path = normalize_remote_path(remote_path);
        self.downloads_started.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.download_latency.is_zero() {
            tokio::time::sleep(self.download_latency).await;
        }

        if self.failing_downloads.contains(&remote_path) {
            return Err(OrgDiskError::download(&remote_path, "injected download failure"));
        }

        let data = self
            .files
            .get(&remote_path)
            .ok_or_else(|| OrgDiskError::download(&remote_path, "no such file"))?;

        tokio::fs::write(local_path, data).await.with_path(local_path)?;
        Ok(data.len() as u64)
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        Ok(DiskUsage {
            used_bytes: self.total_bytes(),
            total_bytes: None,
            trash_bytes: None,
        })
    }

    async fn remove(&self, path: &str, permanently: bool) -> Result<()> {
        if let Ok(mut removed) = self.removed.lock() {
            removed.push((normalize_remote_path(path), permanently));
        }
        Ok(())
    }

    async fn check_session(&self) -> Result<()> {
        Ok(())
    }
}
