//! Process memory sampling
//!
//! The crawl keeps the full inventory in memory, so resident set size is
//! sampled at phase boundaries and the peak reported with the run summary.

use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{get_current_pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resident set size of the current process, in bytes
pub fn current_rss() -> Option<u64> {
    let pid = get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        ProcessRefreshKind::new().with_memory(),
    );
    system.process(pid).map(|process| process.memory())
}

/// Tracks the highest RSS seen across samples
#[derive(Debug, Default)]
pub struct MemoryTracker {
    peak: AtomicU64,
}

impl MemoryTracker {
    /// Create a tracker with no samples
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a sample; returns the current RSS when available
    pub fn sample(&self) -> Option<u64> {
        let rss = current_rss()?;
        self.peak.fetch_max(rss, Ordering::Relaxed);
        Some(rss)
    }

    /// Highest RSS observed, `None` if no sample succeeded
    pub fn peak(&self) -> Option<u64> {
        match self.peak.load(Ordering::Relaxed) {
            0 => None,
            peak => Some(peak),
        }
    }
}
