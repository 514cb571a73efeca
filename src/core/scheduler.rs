//! Bounded-parallel download scheduler
//!
//! One spawned task per file. A task is only spawned once a semaphore
//! permit is free, and it holds that permit for the duration of its
//! transfer, so at most `concurrency` transfers (and tasks) are alive at any
//! instant. The permit is an RAII guard and is released on every exit path.
//! A failed transfer is recorded against its file and never disturbs its
//! siblings.

use crate::core::Shutdown;
use crate::error::{OrgDiskError, Result};
use crate::progress::ProgressReporter;
use crate::storage::{Entry, RemoteStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default number of concurrent transfers
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Upper bound for a single backoff sleep
const MAX_RETRY_DELAY: Duration = Duration::from_secs(64);

/// A single remote-to-local transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    /// Remote file path
    pub remote_path: String,
    /// Local destination
    pub local_path: PathBuf,
    /// Size reported by the listing
    pub size: Option<u64>,
}

impl TransferTask {
    /// Derive the task for `file`, relative to the crawl root
    pub fn for_entry(file: &Entry, remote_root: &str, local_root: &Path) -> Result<Self> {
        Ok(Self {
            remote_path: file.path.clone(),
            local_path: local_root.join(file.relative_to(remote_root)?),
            size: file.size,
        })
    }
}

/// A file that did not make it to local storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    /// Remote file path
    pub path: String,
    /// Why it failed
    pub reason: String,
}

/// Outcome of a download phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadReport {
    /// Tasks created (one per file)
    pub attempted: usize,
    /// Transfers that completed
    pub succeeded: usize,
    /// Transfers that failed
    pub failed: usize,
    /// Per-file failure reasons
    pub failures: Vec<TransferFailure>,
    /// Bytes written locally
    pub bytes: u64,
    /// Wall-clock time of the phase
    pub duration: Duration,
}

impl DownloadReport {
    /// Whether every file was downloaded
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Bytes per second over the phase
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }

    fn record(&mut self, path: String, outcome: Result<u64>) {
        match outcome {
            Ok(bytes) => {
                self.succeeded += 1;
                self.bytes += bytes;
            }
            Err(e) => {
                self.failed += 1;
                self.failures.push(TransferFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum transfers in flight
    pub concurrency: usize,
    /// Extra attempts for a recoverable failure (0 disables retries)
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Downloads a file set under a fixed concurrency limit
pub struct DownloadScheduler<S: RemoteStore + ?Sized + 'static> {
    store: Arc<S>,
    config: SchedulerConfig,
    shutdown: Arc<Shutdown>,
    progress: Arc<ProgressReporter>,
}

impl<S: RemoteStore + ?Sized + 'static> DownloadScheduler<S> {
    /// Create a scheduler over `store`
    pub fn new(store: Arc<S>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            shutdown: Shutdown::shared(),
            progress: Arc::new(ProgressReporter::disabled()),
        }
    }

    /// Share a cancellation handle
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Report progress to `progress`
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Effective concurrency limit (never below one)
    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Download every file in `files` into the tree under `local_root`
    ///
    /// Returns once every task has succeeded or failed. The destination
    /// directories must already exist.
    pub async fn download_all(&self, files: &[Entry], remote_root: &str, local_root: &Path) -> DownloadReport {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency()));
        let mut report = DownloadReport {
            attempted: files.len(),
            ..Default::default()
        };

        self.progress.set_total_files(files.len() as u64);
        self.progress
            .set_total_bytes(files.iter().filter_map(|f| f.size).sum());
        self.progress.set_status("Downloading");

        let mut handles = Vec::new();

        for file in files {
            let task = match TransferTask::for_entry(file, remote_root, local_root) {
                Ok(task) => task,
                Err(e) => {
                    warn!("Rejecting {}: {}", file.path, e);
                    self.progress.file_failed();
                    report.record(file.path.clone(), Err(e));
                    continue;
                }
            };

            // admission waits for a free slot, so at most `concurrency` tasks exist
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.wait_for_shutdown() => Err(OrgDiskError::Cancelled),
                permit = Arc::clone(&semaphore).acquire_owned() => permit.map_err(|e| {
                    OrgDiskError::download(&task.remote_path, format!("slot pool closed: {}", e))
                }),
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    self.progress.file_failed();
                    report.record(task.remote_path, Err(e));
                    continue;
                }
            };

            let store = Arc::clone(&self.store);
            let shutdown = Arc::clone(&self.shutdown);
            let progress = Arc::clone(&self.progress);
            let config = self.config.clone();
            let path = task.remote_path.clone();

            handles.push((
                path,
                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = transfer(store.as_ref(), &task, &config, &shutdown).await;
                    match &outcome {
                        Ok(bytes) => progress.file_done(*bytes),
                        Err(e) => {
                            warn!("Failed to download {}: {}", task.remote_path, e);
                            progress.file_failed();
                        }
                    }
                    outcome
                }),
            ));
        }

        for (path, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(OrgDiskError::download(&path, format!("task join error: {}", e))),
            };
            report.record(path, outcome);
        }

        report.duration = start.elapsed();
        info!(
            "Downloaded {}/{} files ({} failed) in {:.2?}",
            report.succeeded, report.attempted, report.failed, report.duration
        );
        report
    }
}

async fn transfer<S: RemoteStore + ?Sized>(
    store: &S,
    task: &TransferTask,
    config: &SchedulerConfig,
    shutdown: &Shutdown,
) -> Result<u64> {
    let mut retries = 0u32;
    loop {
        debug!("Downloading {} -> {}", task.remote_path, task.local_path.display());
        match store.download(&task.remote_path, &task.local_path).await {
            Ok(bytes) => return Ok(bytes),
            Err(e)
                if e.is_recoverable()
                    && retries < config.max_retries
                    && !shutdown.is_shutdown_requested() =>
            {
                retries += 1;
                let delay = backoff_delay(config.retry_delay, retries);
                debug!(
                    "Retrying {} in {:?} (attempt {}/{}): {}",
                    task.remote_path, delay, retries, config.max_retries, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// `base * 2^(retries - 1)`, capped at [`MAX_RETRY_DELAY`]
fn backoff_delay(base: Duration, retries: u32) -> Duration {
    let factor = 1u32.checked_shl(retries.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}
