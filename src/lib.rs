//! # orgdisk - Bulk Export of Organization Cloud Disks
//!
//! orgdisk walks the cloud disk of every user in an organization and
//! mirrors it to local storage, reports its usage, or empties it.
//!
//! ## Architecture
//!
//! An export runs in three strictly ordered phases per user:
//!
//! - **Crawl**: [`core::TreeCrawler`] enumerates the remote tree with an
//!   explicit worklist, one paced listing call at a time
//! - **Mirror**: [`fs::LocalMirrorBuilder`] recreates every discovered
//!   directory locally
//! - **Download**: [`core::DownloadScheduler`] transfers every file under a
//!   fixed concurrency limit, recording per-file failures
//!
//! [`core::RunCoordinator`] sequences the phases and produces a
//! [`core::RunSummary`]; [`batch::BatchRunner`] repeats that for every user
//! of a user list.
//!
//! ## Quick Start
//!
//! ```no_run
//! use orgdisk::config::RunConfig;
//! use orgdisk::core::RunCoordinator;
//! use orgdisk::storage::{DiskApiClient, DiskApiConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> orgdisk::Result<()> {
//! let store = Arc::new(DiskApiClient::new("oauth-token", DiskApiConfig::default())?);
//! let config = RunConfig {
//!     concurrency: 8,
//!     ..Default::default()
//! };
//!
//! let summary = RunCoordinator::new(store, config)
//!     .run("user@example.com")
//!     .await?;
//! summary.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing Against Memory
//!
//! ```
//! use orgdisk::core::{RequestPacer, TreeCrawler};
//! use orgdisk::storage::MemoryStore;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new()
//!     .with_file("/Docs/a.txt", "a")
//!     .with_file("/Docs/b.txt", "b");
//!
//! let result = TreeCrawler::new(&store)
//!     .with_pacer(RequestPacer::unlimited())
//!     .crawl("/")
//!     .await
//!     .unwrap();
//! assert_eq!(result.files.len(), 2);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod batch;
pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod progress;
pub mod storage;
pub mod system;
pub mod users;

// Re-export commonly used types
pub use config::RunConfig;
pub use core::{RunCoordinator, RunSummary};
pub use error::{OrgDiskError, Result};
pub use storage::{Entry, RemoteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use orgdisk::prelude::*;
    //! ```

    pub use crate::auth::{AccessToken, StaticToken, TokenExchange, TokenProvider};
    pub use crate::batch::{BatchReport, BatchRunner, StoreFactory, UserOutcome};
    pub use crate::config::{OutputFormat, RunConfig};
    pub use crate::core::{
        CrawlResult, DownloadReport, DownloadScheduler, ListingFailurePolicy, RequestPacer,
        RunCoordinator, RunSummary, Shutdown, TreeCrawler,
    };
    pub use crate::error::{OrgDiskError, Result};
    pub use crate::fs::LocalMirrorBuilder;
    pub use crate::progress::ProgressReporter;
    pub use crate::storage::{DiskApiClient, Entry, EntryKind, MemoryStore, RemoteStore};
    pub use crate::users::{load_users, UserRecord};
}
