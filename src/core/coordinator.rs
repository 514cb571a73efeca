//! Run coordinator
//!
//! Runs the three phases of a single-user export in strict order: crawl,
//! mirror, download. A phase only starts once the previous one has fully
//! completed, since it needs the whole inventory.

use crate::config::{OutputFormat, RunConfig};
use crate::core::{
    DownloadReport, DownloadScheduler, Shutdown, SkippedSubtree, TransferFailure, TreeCrawler,
};
use crate::error::Result;
use crate::fs::LocalMirrorBuilder;
use crate::progress::ProgressReporter;
use crate::storage::RemoteStore;
use crate::system::MemoryTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Final report of a single-user run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// User whose disk was exported
    pub user: String,
    /// Remote root that was crawled
    pub remote_root: String,
    /// Local mirror root
    pub local_root: PathBuf,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Directories discovered
    pub directories: usize,
    /// Local directories newly created
    pub directories_created: usize,
    /// Files discovered
    pub files: usize,
    /// Listing calls issued
    pub listing_calls: usize,
    /// Subtrees skipped after a listing failure
    pub skipped: Vec<SkippedSubtree>,
    /// Download outcome
    pub download: DownloadReport,
    /// Crawl phase duration
    pub crawl_duration: Duration,
    /// Mirror phase duration
    pub mirror_duration: Duration,
    /// Whole run duration
    pub total_duration: Duration,
    /// Highest resident set size sampled, in bytes
    pub peak_memory_bytes: Option<u64>,
}

impl RunSummary {
    /// Transfers that succeeded
    pub fn succeeded(&self) -> usize {
        self.download.succeeded
    }

    /// Transfers that failed
    pub fn failed(&self) -> usize {
        self.download.failed
    }

    /// Per-file failures
    pub fn failures(&self) -> &[TransferFailure] {
        &self.download.failures
    }

    /// Whether every discovered file was downloaded and nothing was skipped
    pub fn is_complete(&self) -> bool {
        self.download.is_complete() && self.skipped.is_empty()
    }

    /// Print in the requested format
    pub fn print(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => self.print_summary(),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(self)?),
        }
        Ok(())
    }

    /// Print a human-readable summary
    pub fn print_summary(&self) {
        println!("\n=== Export Summary: {} ===", self.user);
        println!("Remote root:     {}", self.remote_root);
        println!("Local root:      {}", self.local_root.display());
        println!("Directories:     {} ({} created)", self.directories, self.directories_created);
        println!("Files:           {}", self.files);
        println!("Downloaded:      {}", self.download.succeeded);
        println!("Failed:          {}", self.download.failed);
        println!("Bytes:           {}", humansize::format_size(self.download.bytes, humansize::BINARY));
        println!("Listing calls:   {}", self.listing_calls);
        println!("Crawl:           {:.2?}", self.crawl_duration);
        println!("Download:        {:.2?}", self.download.duration);
        println!("Duration:        {:.2?}", self.total_duration);
        println!(
            "Throughput:      {}/s",
            humansize::format_size(self.download.throughput() as u64, humansize::BINARY)
        );
        if let Some(peak) = self.peak_memory_bytes {
            println!("Peak memory:     {}", humansize::format_size(peak, humansize::BINARY));
        }

        if !self.skipped.is_empty() {
            println!("\nSkipped subtrees: {}", self.skipped.len());
            for skipped in &self.skipped {
                println!("  {} - {}", skipped.path, skipped.reason);
            }
        }

        if !self.download.failures.is_empty() {
            println!("\nFailures: {}", self.download.failures.len());
            for failure in &self.download.failures {
                println!("  {} - {}", failure.path, failure.reason);
            }
        }
    }
}

/// Sequences crawl, mirror and download for one user
pub struct RunCoordinator<S: RemoteStore + ?Sized + 'static> {
    store: Arc<S>,
    config: RunConfig,
    shutdown: Arc<Shutdown>,
    progress: Arc<ProgressReporter>,
}

impl<S: RemoteStore + ?Sized + 'static> RunCoordinator<S> {
    /// Create a coordinator for `store`
    pub fn new(store: Arc<S>, config: RunConfig) -> Self {
        let progress = Arc::new(ProgressReporter::with_enabled(config.show_progress));
        Self {
            store,
            config,
            shutdown: Shutdown::shared(),
            progress,
        }
    }

    /// Share a cancellation handle
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Export `user`'s disk into `<output>/<user>`
    ///
    /// Fatal errors (listing under the abort policy, cancellation during the
    /// crawl, local I/O while mirroring) end the run; per-file failures are
    /// part of the summary.
    pub async fn run(&self, user: &str) -> Result<RunSummary> {
        let local_root = self.config.local_root_for(user)?;
        self.run_into(user, local_root).await
    }

    /// Export into an explicit local root
    pub async fn run_into(&self, user: &str, local_root: PathBuf) -> Result<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();
        let memory = MemoryTracker::new();
        memory.sample();

        info!("[{}] Crawling {}", user, self.config.remote_root);
        self.progress.set_status(&format!("Crawling {}", self.config.remote_root));
        let crawl = TreeCrawler::new(self.store.as_ref())
            .with_pacer(self.config.pacer())
            .with_policy(self.config.listing_policy)
            .with_shutdown(Arc::clone(&self.shutdown))
            .with_progress(Arc::clone(&self.progress))
            .crawl(&self.config.remote_root)
            .await;
        let crawl = match crawl {
            Ok(crawl) => crawl,
            Err(e) => {
                self.progress.finish_error(&e.to_string());
                return Err(e);
            }
        };
        memory.sample();

        info!("[{}] Mirroring {} directories", user, crawl.directories.len());
        let mirror_start = Instant::now();
        let mirror = LocalMirrorBuilder::new(&local_root, crawl.root.as_str())
            .ensure_local_tree(&crawl.directories)
            .map_err(|e| e.with_context(format!("mirroring into {}", local_root.display())))?;
        let mirror_duration = mirror_start.elapsed();

        info!("[{}] Downloading {} files", user, crawl.files.len());
        let download = DownloadScheduler::new(Arc::clone(&self.store), self.config.scheduler_config())
            .with_shutdown(Arc::clone(&self.shutdown))
            .with_progress(Arc::clone(&self.progress))
            .download_all(&crawl.files, &crawl.root, &local_root)
            .await;
        memory.sample();

        let summary = RunSummary {
            user: user.to_string(),
            remote_root: crawl.root.clone(),
            local_root,
            started_at,
            directories: crawl.directories.len(),
            directories_created: mirror.created,
            files: crawl.files.len(),
            listing_calls: crawl.listing_calls,
            skipped: crawl.skipped,
            download,
            crawl_duration: crawl.duration,
            mirror_duration,
            total_duration: start.elapsed(),
            peak_memory_bytes: memory.peak(),
        };

        let message = format!(
            "{}: {}/{} files downloaded",
            user,
            summary.succeeded(),
            summary.files
        );
        if summary.is_complete() {
            self.progress.finish_success(&message);
        } else {
            self.progress.finish_error(&message);
        }

        info!(
            "[{}] Done in {:.1} min, {} downloaded, {} failed, used memory {}",
            user,
            summary.total_duration.as_secs_f64() / 60.0,
            summary.succeeded(),
            summary.failed(),
            summary
                .peak_memory_bytes
                .map(|b| humansize::format_size(b, humansize::BINARY))
                .unwrap_or_else(|| "n/a".to_string())
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ListingFailurePolicy, Shutdown};
    use crate::error::OrgDiskError;
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    fn config(output: &std::path::Path) -> RunConfig {
        RunConfig {
            output_dir: output.to_path_buf(),
            crawl_delay: Duration::ZERO,
            concurrency: 3,
            ..Default::default()
        }
    }

    fn nested_store() -> MemoryStore {
        MemoryStore::new()
            .with_file("/Documents/report.pdf", vec![1u8; 300])
            .with_file("/Documents/2023/q1.xlsx", vec![2u8; 120])
            .with_file("/Documents/2023/q2.xlsx", vec![3u8; 80])
            .with_file("/Photos/cat.jpg", vec![4u8; 500])
            .with_file("/readme.txt", "hello")
            .with_dir("/Empty")
    }

    #[tokio::test]
    async fn test_full_run_mirrors_tree() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(nested_store());
        let coordinator = RunCoordinator::new(Arc::clone(&store), config(tmp.path()));

        let summary = coordinator.run("user@example.com").await.unwrap();

        let root = tmp.path().join("user@example.com");
        assert_eq!(summary.directories, 4);
        assert_eq!(summary.files, 5);
        assert_eq!(summary.succeeded(), 5);
        assert_eq!(summary.failed(), 0);
        assert!(summary.is_complete());
        assert_eq!(summary.download.bytes, store.total_bytes());
        assert_eq!(summary.directories_created, 5);
        assert!(root.join("Empty").is_dir());
        assert_eq!(std::fs::read(root.join("Documents/2023/q2.xlsx")).unwrap(), vec![3u8; 80]);
        assert_eq!(std::fs::read_to_string(root.join("readme.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_rerun_creates_no_directories() {
        let tmp = TempDir::new().unwrap();
        let coordinator = RunCoordinator::new(Arc::new(nested_store()), config(tmp.path()));

        coordinator.run("u@example.com").await.unwrap();
        let second = coordinator.run("u@example.com").await.unwrap();

        assert_eq!(second.directories_created, 0);
        assert_eq!(second.succeeded(), 5);
    }

    #[tokio::test]
    async fn test_failed_transfers_are_reported() {
        let tmp = TempDir::new().unwrap();
        let store = nested_store().failing_download("/Photos/cat.jpg");
        let coordinator = RunCoordinator::new(Arc::new(store), config(tmp.path()));

        let summary = coordinator.run("u@example.com").await.unwrap();

        assert_eq!(summary.succeeded() + summary.failed(), summary.files);
        assert_eq!(summary.failures()[0].path, "/Photos/cat.jpg");
        assert!(!summary.is_complete());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_before_download() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(nested_store().failing_listing("/Photos"));
        let coordinator = RunCoordinator::new(Arc::clone(&store), config(tmp.path()));

        let err = coordinator.run("u@example.com").await.unwrap_err();

        assert!(matches!(err, OrgDiskError::Listing { ref path, .. } if path == "/Photos"));
        assert_eq!(store.downloads_started(), 0);
        assert!(!tmp.path().join("u@example.com").exists());
    }

    #[tokio::test]
    async fn test_skip_policy_continues() {
        let tmp = TempDir::new().unwrap();
        let store = nested_store().failing_listing("/Documents/2023");
        let config = RunConfig {
            listing_policy: ListingFailurePolicy::SkipSubtree,
            ..config(tmp.path())
        };

        let summary = RunCoordinator::new(Arc::new(store), config)
            .run("u@example.com")
            .await
            .unwrap();

        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.succeeded(), 3);
        assert!(!summary.is_complete());
    }

    #[tokio::test]
    async fn test_subdirectory_root() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            remote_root: "/Documents".to_string(),
            ..config(tmp.path())
        };

        let summary = RunCoordinator::new(Arc::new(nested_store()), config)
            .run("u@example.com")
            .await
            .unwrap();

        let root = tmp.path().join("u@example.com");
        assert_eq!(summary.files, 3);
        assert!(root.join("2023/q1.xlsx").is_file());
        assert!(root.join("report.pdf").is_file());
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let tmp = TempDir::new().unwrap();
        let shutdown = Shutdown::shared();
        shutdown.request_shutdown();

        let result = RunCoordinator::new(Arc::new(nested_store()), config(tmp.path()))
            .with_shutdown(shutdown)
            .run("u@example.com")
            .await;

        assert!(matches!(result, Err(OrgDiskError::Cancelled)));
    }

    #[tokio::test]
    async fn test_summary_serializes() {
        let tmp = TempDir::new().unwrap();
        let summary = RunCoordinator::new(Arc::new(nested_store()), config(tmp.path()))
            .run("u@example.com")
            .await
            .unwrap();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["user"], "u@example.com");
        assert_eq!(json["download"]["succeeded"], 5);
    }
}
