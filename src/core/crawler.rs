//! Remote tree crawler
//!
//! Enumerates a remote directory tree of unknown depth with an explicit
//! worklist, one paced listing call at a time. A directory is recorded the
//! moment it is seen as a child, before its own children are listed, so
//! every directory precedes its descendants in the result.
//!
//! Both collections are held in memory for the whole run; their size is
//! bounded only by the number of remote objects.

use crate::core::{RequestPacer, Shutdown};
use crate::error::{OrgDiskError, Result};
use crate::progress::ProgressReporter;
use crate::storage::{normalize_remote_path, Entry, EntryKind, RemoteStore};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What to do when listing a directory fails
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingFailurePolicy {
    /// Abort the whole crawl
    #[default]
    Abort,
    /// Log, record the subtree as skipped, continue
    #[value(name = "skip")]
    SkipSubtree,
}

/// A subtree left out because its listing failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSubtree {
    /// Remote directory that could not be listed
    pub path: String,
    /// Failure reason
    pub reason: String,
}

/// Inventory produced by a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Remote root that was crawled
    pub root: String,
    /// Discovered directories, parents before descendants
    pub directories: Vec<Entry>,
    /// Discovered files
    pub files: Vec<Entry>,
    /// Number of listing calls issued
    pub listing_calls: usize,
    /// Subtrees skipped under [`ListingFailurePolicy::SkipSubtree`]
    pub skipped: Vec<SkippedSubtree>,
    /// Crawl duration
    pub duration: Duration,
}

impl CrawlResult {
    /// Sum of the sizes the remote reported for discovered files
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().filter_map(|f| f.size).sum()
    }

}

/// Recursive enumerator for a remote store
pub struct TreeCrawler<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    pacer: RequestPacer,
    policy: ListingFailurePolicy,
    shutdown: Arc<Shutdown>,
    progress: Option<Arc<ProgressReporter>>,
}

impl<'a, S: RemoteStore + ?Sized> TreeCrawler<'a, S> {
    /// Create a crawler with the default pacing and abort-on-failure policy
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            pacer: RequestPacer::default(),
            policy: ListingFailurePolicy::Abort,
            shutdown: Shutdown::shared(),
            progress: None,
        }
    }

    /// Set the pacer that spaces listing calls
    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Set the listing failure policy
    pub fn with_policy(mut self, policy: ListingFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a cancellation handle
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Show the directory being listed on `progress`
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Enumerate everything below `root`
    ///
    /// A failure to list `root` itself is always fatal; failures further
    /// down follow the configured [`ListingFailurePolicy`]. Authentication
    /// failures and cancellation end the crawl under either policy.
    pub async fn crawl(&self, root: &str) -> Result<CrawlResult> {
        let start = Instant::now();
        let root = normalize_remote_path(root);

        let mut directories = Vec::new();
        let mut files = Vec::new();
        let mut skipped = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut listing_calls = 0usize;

        let mut worklist = vec![root.clone()];
        seen.insert(root.clone());

        while let Some(dir) = worklist.pop() {
            self.pacer.until_ready_or_cancelled(&self.shutdown).await?;

            listing_calls += 1;
            debug!("Listing {}", dir);
            if let Some(progress) = &self.progress {
                progress.set_current_path(&dir);
            }

            let children = match self.store.list(&dir).await {
                Ok(children) => children,
                Err(e @ (OrgDiskError::Auth { .. } | OrgDiskError::Cancelled)) => return Err(e),
                Err(e) => {
                    let reason = match e {
                        OrgDiskError::Listing { message, .. } => message,
                        other => other.to_string(),
                    };

                    if dir == root || self.policy == ListingFailurePolicy::Abort {
                        return Err(OrgDiskError::listing(&dir, reason));
                    }

                    warn!("Skipping subtree {}: {}", dir, reason);
                    skipped.push(SkippedSubtree { path: dir, reason });
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for child in children {
                match child.kind {
                    EntryKind::File => files.push(child),
                    EntryKind::Directory => {
                        if seen.insert(child.path.clone()) {
                            subdirs.push(child.path.clone());
                            directories.push(child);
                        }
                    }
                }
            }

            // reversed so the first listed child is visited next (pre-order)
            worklist.extend(subdirs.into_iter().rev());
        }

        info!(
            "Crawled {}: {} directories, {} files in {} listing calls",
            root,
            directories.len(),
            files.len(),
            listing_calls
        );

        Ok(CrawlResult {
            root,
            directories,
            files,
            listing_calls,
            skipped,
            duration: start.elapsed(),
        })
    }
}
