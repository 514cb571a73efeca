//! Organization user list
//!
//! Users come from a CSV export of the organization directory with at least
//! the `ID` and `Email` columns. Only rows with a 16-character `ID` are
//! real accounts; anything else (section headers, comments, service rows)
//! is skipped.

use crate::error::{OrgDiskError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Length of an account id in the directory export
pub const USER_ID_LEN: usize = 16;

/// A single organization user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Account id
    #[serde(rename = "ID")]
    pub id: String,
    /// Primary email
    #[serde(rename = "Email")]
    pub email: String,
}

impl UserRecord {
    /// Whether the row describes a real account
    pub fn is_account(&self) -> bool {
        self.id.chars().count() == USER_ID_LEN && !self.email.trim().is_empty()
    }
}

/// Read the user list at `path`
pub fn load_users(path: &Path) -> Result<Vec<UserRecord>> {
    if !path.is_file() {
        return Err(OrgDiskError::config(format!(
            "user list '{}' does not exist",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut users = Vec::new();
    for (line, row) in reader.deserialize::<UserRecord>().enumerate() {
        match row {
            Ok(user) if user.is_account() => users.push(user),
            Ok(user) => debug!("Skipping row {} with id '{}'", line + 2, user.id),
            Err(e) => warn!("Skipping unreadable row {} in {}: {}", line + 2, path.display(), e),
        }
    }

    debug!("Loaded {} users from {}", users.len(), path.display());
    Ok(users)
}
