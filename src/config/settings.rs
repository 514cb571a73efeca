//! Configuration settings for orgdisk
//!
//! Defines the CLI arguments, the subcommands and the runtime settings of a
//! download run.

use crate::auth::{SubjectKind, DEFAULT_OAUTH_URL};
use crate::core::{ListingFailurePolicy, RequestPacer, SchedulerConfig, DEFAULT_CONCURRENCY};
use crate::error::{OrgDiskError, Result};
use crate::storage::{normalize_remote_path, DEFAULT_DISK_API_URL};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// orgdisk - bulk export and cleanup of organization users' cloud disks
#[derive(Parser, Debug, Clone)]
#[command(name = "orgdisk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bulk export and cleanup of organization users' cloud disks")]
#[command(long_about = r#"
orgdisk walks the cloud disk of every user in an organization user list and
either mirrors it to local storage, reports its usage, or empties it.

Per-user access tokens are obtained through the OAuth token exchange of a
service application (--client-id / --client-secret), or a single pre-issued
token can be supplied with --token.

Examples:
  orgdisk download --output /backup                 # Export every user's disk
  orgdisk download --output /backup --concurrency 4 --on-listing-error skip
  orgdisk info --report usage.csv                   # Disk usage per user
  orgdisk purge --permanent --yes                   # Empty every disk
"#)]
pub struct CliArgs {
    /// CSV file with the organization's users (columns ID, Email)
    #[arg(long, default_value = "users.csv", value_name = "PATH")]
    pub users: PathBuf,

    /// Service application client id
    #[arg(long, env = "CLIENT_ID", value_name = "ID")]
    pub client_id: Option<String>,

    /// Service application client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true, value_name = "SECRET")]
    pub client_secret: Option<String>,

    /// Pre-issued OAuth token, used for every user instead of token exchange
    #[arg(long, env = "DISK_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// User attribute presented to the token exchange
    #[arg(long, value_enum, default_value = "email")]
    pub subject_kind: SubjectKind,

    /// Disk REST API base URL
    #[arg(long, default_value = DEFAULT_DISK_API_URL, value_name = "URL")]
    pub api_url: String,

    /// OAuth token endpoint
    #[arg(long, default_value = DEFAULT_OAUTH_URL, value_name = "URL")]
    pub oauth_url: String,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Mirror every user's disk into a local directory
    #[command(name = "download")]
    Download(DownloadArgs),

    /// Write a CSV report of each user's disk usage
    #[command(name = "info")]
    Info {
        /// Report destination
        #[arg(long, default_value = "disk_info.csv", value_name = "PATH")]
        report: PathBuf,
    },

    /// Remove every top-level item from each user's disk
    #[command(name = "purge")]
    Purge {
        /// Delete permanently instead of moving to the trash
        #[arg(long)]
        permanent: bool,

        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Options of the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Local directory receiving one subdirectory per user
    #[arg(short = 'o', long, default_value = "export", value_name = "DIR")]
    pub output: PathBuf,

    /// Remote directory to export
    #[arg(long, default_value = "/", value_name = "PATH")]
    pub root: String,

    /// Maximum concurrent file transfers
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_name = "NUM")]
    pub concurrency: usize,

    /// Minimum delay between directory listings (e.g. 100ms, 1s)
    #[arg(long, default_value = "100ms", value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub crawl_delay: Duration,

    /// What to do when a directory cannot be listed
    #[arg(long, value_enum, default_value = "abort")]
    pub on_listing_error: ListingFailurePolicy,

    /// Retry a failed transfer N times
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub retries: u32,

    /// Delay before the first retry; doubles each attempt
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub retry_delay: Duration,

    /// Show progress bars
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Summary format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the batch summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// Output format for summaries
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

/// Settings of a single-user download run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Remote directory to export
    pub remote_root: String,
    /// Local directory receiving one subdirectory per user
    pub output_dir: PathBuf,
    /// Maximum concurrent transfers
    pub concurrency: usize,
    /// Minimum delay between listings
    pub crawl_delay: Duration,
    /// Listing failure handling
    pub listing_policy: ListingFailurePolicy,
    /// Transfer retries
    pub max_retries: u32,
    /// First retry delay
    pub retry_delay: Duration,
    /// Draw progress bars
    pub show_progress: bool,
    /// Summary format
    pub format: OutputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            remote_root: "/".to_string(),
            output_dir: PathBuf::from("export"),
            concurrency: DEFAULT_CONCURRENCY,
            crawl_delay: crate::core::DEFAULT_CRAWL_DELAY,
            listing_policy: ListingFailurePolicy::Abort,
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
            show_progress: false,
            format: OutputFormat::Text,
        }
    }
}

impl RunConfig {
    /// Build and validate from download arguments
    pub fn from_download_args(args: &DownloadArgs) -> Result<Self> {
        let config = Self {
            remote_root: normalize_remote_path(&args.root),
            output_dir: args.output.clone(),
            concurrency: args.concurrency,
            crawl_delay: args.crawl_delay,
            listing_policy: args.on_listing_error,
            max_retries: args.retries,
            retry_delay: args.retry_delay,
            show_progress: args.progress,
            format: args.format,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(OrgDiskError::config("concurrency must be at least 1"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(OrgDiskError::config("output directory must not be empty"));
        }
        Ok(())
    }

    /// Local mirror root for `identity`: `<output>/<identity>`
    pub fn local_root_for(&self, identity: &str) -> Result<PathBuf> {
        let usable = !identity.is_empty()
            && identity != "."
            && identity != ".."
            && !identity.contains(['/', '\\']);
        if !usable {
            return Err(OrgDiskError::InvalidPath(format!(
                "user identity '{}' cannot be used as a directory name",
                identity
            )));
        }
        Ok(self.output_dir.join(identity))
    }

    /// Listing pacer for the crawl
    pub fn pacer(&self) -> RequestPacer {
        RequestPacer::new(self.crawl_delay)
    }

    /// Download scheduler settings
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        }
    }
}
