//! Progress reporter for crawl and download phases
//!
//! A status spinner that follows the crawl, then file and byte bars for the
//! download. In quiet mode the bars still count but draw nothing.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Longest path shown on the status line, in characters
const MAX_PATH_WIDTH: usize = 60;

/// Progress reporter shared by the phases of a run
pub struct ProgressReporter {
    multi: MultiProgress,
    status: ProgressBar,
    files_bar: ProgressBar,
    bytes_bar: ProgressBar,
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Keep the tail of long paths, which names the directory itself
fn shorten_path(path: &str) -> String {
    let len = path.chars().count();
    if len <= MAX_PATH_WIDTH {
        return path.to_string();
    }
    let tail: String = path.chars().skip(len - (MAX_PATH_WIDTH - 3)).collect();
    format!("...{}", tail)
}

impl ProgressReporter {
    /// Create a visible reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status.enable_steady_tick(Duration::from_millis(120));

        let files_bar = multi.add(ProgressBar::new(0));
        files_bar.set_style(bar_style(
            "{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%)",
        ));
        files_bar.set_prefix("Files");

        let bytes_bar = multi.add(ProgressBar::new(0));
        bytes_bar.set_style(bar_style(
            "{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})",
        ));
        bytes_bar.set_prefix("Data ");

        Self {
            multi,
            status,
            files_bar,
            bytes_bar,
        }
    }

    /// Create a reporter that draws nothing
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.status.disable_steady_tick();
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Build from a "show progress" flag
    pub fn with_enabled(enabled: bool) -> Self {
        if enabled {
            Self::new()
        } else {
            Self::disabled()
        }
    }

    /// Number of files to download
    pub fn set_total_files(&self, total: u64) {
        self.files_bar.set_length(total);
    }

    /// Bytes to download, as reported by the listings
    pub fn set_total_bytes(&self, total: u64) {
        self.bytes_bar.set_length(total);
    }

    /// Record a finished transfer
    pub fn file_done(&self, bytes: u64) {
        self.files_bar.inc(1);
        self.bytes_bar.inc(bytes);
    }

    /// Record a failed transfer
    pub fn file_failed(&self) {
        self.files_bar.inc(1);
    }

    /// Set the status line
    pub fn set_status(&self, msg: &str) {
        self.status.set_message(msg.to_string());
    }

    /// Show the remote directory currently being listed
    pub fn set_current_path(&self, path: &str) {
        self.status.set_message(shorten_path(path));
    }

    /// Current status line
    pub fn status_message(&self) -> String {
        self.status.message()
    }

    /// Finish with a success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
        self.files_bar.finish();
        self.bytes_bar.finish();
    }

    /// Finish with an error message
    pub fn finish_error(&self, message: &str) {
        self.status.finish_with_message(format!("✗ {}", message));
        self.files_bar.abandon();
        self.bytes_bar.abandon();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_count_terminal_transfers() {
        let reporter = ProgressReporter::disabled();
        reporter.set_total_files(4);
        reporter.set_total_bytes(1000);

        reporter.file_done(400);
        reporter.file_failed();

        assert_eq!(reporter.files_bar.length(), Some(4));
        assert_eq!(reporter.files_bar.position(), 2);
        assert_eq!(reporter.bytes_bar.position(), 400);
    }

    #[test]
    fn test_long_path_keeps_its_tail() {
        let long = format!("/{}/target", "x".repeat(100));
        let shown = shorten_path(&long);

        assert_eq!(shown.chars().count(), MAX_PATH_WIDTH);
        assert!(shown.starts_with("..."));
        assert!(shown.ends_with("/target"));
        assert_eq!(shorten_path("/short"), "/short");
    }

    #[test]
    fn test_current_path_on_status_line() {
        let reporter = ProgressReporter::disabled();
        reporter.set_current_path("/Docs/2024");
        assert_eq!(reporter.status_message(), "/Docs/2024");
    }
}
