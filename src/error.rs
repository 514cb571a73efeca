//! Error types for OrgDisk
//!
//! This module defines all error types used throughout the application.
//! Errors fall in two classes: fatal ones that abort the run for the
//! current user (authentication, listing) and per-item ones that the
//! download scheduler records and moves past.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for OrgDisk operations
#[derive(Error, Debug)]
pub enum OrgDiskError {
    /// Credentials rejected or token exchange failed
    #[error("Authentication failed for '{identity}': {message}")]
    Auth { identity: String, message: String },

    /// Directory listing failed on the remote store
    #[error("Listing failed for remote path '{path}': {message}")]
    Listing { path: String, message: String },

    /// Single file transfer failed
    #[error("Download failed for remote path '{path}': {message}")]
    Download { path: String, message: String },

    /// I/O error during local file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote path cannot be mapped under the local root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Unexpected response from the remote API
    #[error("Remote API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report reading or writing error
    #[error("Report error: {0}")]
    Report(String),

    /// Operation cancelled by user
    #[error("Operation cancelled")]
    Cancelled,

    /// Multiple errors occurred
    #[error("Multiple errors occurred ({count} errors)")]
    MultipleErrors {
        count: usize,
        errors: Vec<OrgDiskError>,
    },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<OrgDiskError>,
    },
}

impl OrgDiskError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an authentication error
    pub fn auth(identity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            identity: identity.into(),
            message: message.into(),
        }
    }

    /// Create a listing error
    pub fn listing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Listing {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a download error
    pub fn download(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Download { .. } | Self::Http(_) => true,
            Self::RemoteApi { status, .. } => *status == 429 || *status >= 500,
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
            ),
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Check if this error aborts the run for the current user
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Auth { .. } | Self::Listing { .. } | Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Get the remote path associated with this error, if any
    pub fn remote_path(&self) -> Option<&str> {
        match self {
            Self::Listing { path, .. } | Self::Download { path, .. } => Some(path),
            Self::WithContext { source, .. } => source.remote_path(),
            _ => None,
        }
    }

    /// Get the local path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::WithContext { source, .. } => source.path(),
            _ => None,
        }
    }
}

/// Result type alias for OrgDisk operations
pub type Result<T> = std::result::Result<T, OrgDiskError>;

impl From<std::io::Error> for OrgDiskError {
    fn from(err: std::io::Error) -> Self {
        OrgDiskError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for OrgDiskError {
    fn from(err: serde_json::Error) -> Self {
        OrgDiskError::Report(err.to_string())
    }
}

impl From<csv::Error> for OrgDiskError {
    fn from(err: csv::Error) -> Self {
        OrgDiskError::Report(err.to_string())
    }
}

impl From<reqwest::Error> for OrgDiskError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => OrgDiskError::RemoteApi {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => OrgDiskError::Http(err.to_string()),
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| OrgDiskError::io(path, e))
    }
}

/// Collects multiple results into a single result
pub fn collect_errors<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(successes),
        1 => Err(errors.remove(0)),
        count => Err(OrgDiskError::MultipleErrors { count, errors }),
    }
}
