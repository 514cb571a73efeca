//! Multi-user batch runner
//!
//! Users are processed one after another. For each user a token is
//! obtained, a store session opened and the command executed; an error that
//! is fatal for one user is logged and recorded, and the batch moves on to
//! the next user.

use crate::auth::{AccessToken, SubjectKind, TokenProvider};
use crate::config::RunConfig;
use crate::core::{RunCoordinator, RunSummary, Shutdown};
use crate::error::{collect_errors, IoResultExt, OrgDiskError, Result};
use crate::storage::{http_client, DiskApiClient, DiskApiConfig, RemoteStore};
use crate::users::UserRecord;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Opens a store session from a user token
pub trait StoreFactory: Send + Sync {
    /// Connect with `token`
    fn connect(&self, token: &AccessToken) -> Result<Arc<dyn RemoteStore>>;
}

/// Creates [`DiskApiClient`] sessions sharing one connection pool
pub struct DiskApiFactory {
    http: Client,
    config: DiskApiConfig,
}

impl DiskApiFactory {
    /// Create a factory for the given API settings
    pub fn new(config: DiskApiConfig) -> Result<Self> {
        let http = http_client(&config)?;
        Ok(Self { http, config })
    }
}

impl StoreFactory for DiskApiFactory {
    fn connect(&self, token: &AccessToken) -> Result<Arc<dyn RemoteStore>> {
        Ok(Arc::new(DiskApiClient::with_http(
            self.http.clone(),
            token.secret(),
            self.config.clone(),
        )))
    }
}

/// Terminal state of one user in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UserOutcome {
    /// The command ran to the end for this user
    Completed,
    /// A fatal error stopped the command for this user
    Failed {
        /// Error message
        reason: String,
    },
}

/// Per-user entry of a batch report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReport {
    /// Account id
    pub id: String,
    /// Email
    pub email: String,
    /// Outcome
    pub outcome: UserOutcome,
    /// Export summary, for download runs that completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

/// Result of a whole batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Batch start
    pub started_at: DateTime<Utc>,
    /// Batch end
    pub finished_at: DateTime<Utc>,
    /// One entry per user, in input order
    pub users: Vec<UserReport>,
}

impl BatchReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            users: Vec::new(),
        }
    }

    fn push(&mut self, user: &UserRecord, result: Result<Option<RunSummary>>) {
        let (outcome, summary) = match result {
            Ok(summary) => (UserOutcome::Completed, summary),
            Err(e) => {
                error!("[{}] {}", user.email, e);
                (UserOutcome::Failed { reason: e.to_string() }, None)
            }
        };
        self.users.push(UserReport {
            id: user.id.clone(),
            email: user.email.clone(),
            outcome,
            summary,
        });
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// Users whose command completed
    pub fn completed(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.outcome == UserOutcome::Completed)
            .count()
    }

    /// Users that failed
    pub fn failed(&self) -> usize {
        self.users.len() - self.completed()
    }

    /// Print per-user outcomes
    pub fn print_summary(&self) {
        println!("\n=== Batch Summary ===");
        println!("Users:           {}", self.users.len());
        println!("Completed:       {}", self.completed());
        println!("Failed:          {}", self.failed());
        println!(
            "Duration:        {}",
            humantime::format_duration(
                (self.finished_at - self.started_at)
                    .to_std()
                    .unwrap_or_default()
            )
        );

        for user in &self.users {
            match (&user.outcome, &user.summary) {
                (UserOutcome::Failed { reason }, _) => println!("  ✗ {} - {}", user.email, reason),
                (UserOutcome::Completed, Some(summary)) => println!(
                    "  ✓ {} - {}/{} files, {} failed",
                    user.email,
                    summary.succeeded(),
                    summary.files,
                    summary.failed()
                ),
                (UserOutcome::Completed, None) => println!("  ✓ {}", user.email),
            }
        }
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_path(path)
    }
}

/// One row of the disk usage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRow {
    /// Account id
    #[serde(rename = "ID")]
    pub id: String,
    /// Email
    #[serde(rename = "Email")]
    pub email: String,
    /// Used space in megabytes
    #[serde(rename = "Size MB")]
    pub size_mb: u64,
}

/// Write usage rows as CSV
pub fn write_usage_report(path: &Path, rows: &[UsageRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().with_path(path)?;
    Ok(())
}

/// Runs a command across a user list
pub struct BatchRunner<'a> {
    tokens: &'a dyn TokenProvider,
    stores: &'a dyn StoreFactory,
    subject: SubjectKind,
    shutdown: Arc<Shutdown>,
}

impl<'a> BatchRunner<'a> {
    /// Create a runner presenting each user's email to the token provider
    pub fn new(tokens: &'a dyn TokenProvider, stores: &'a dyn StoreFactory) -> Self {
        Self {
            tokens,
            stores,
            subject: SubjectKind::Email,
            shutdown: Shutdown::shared(),
        }
    }

    /// Choose which user attribute identifies the user to the token provider
    pub fn with_subject(mut self, subject: SubjectKind) -> Self {
        self.subject = subject;
        self
    }

    /// Share a cancellation handle
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn identity<'u>(&self, user: &'u UserRecord) -> &'u str {
        match self.subject {
            SubjectKind::Email => &user.email,
            SubjectKind::Uid => &user.id,
        }
    }

    async fn session(&self, user: &UserRecord) -> Result<Arc<dyn RemoteStore>> {
        let token = self.tokens.token_for(self.identity(user)).await?;
        let store = self.stores.connect(&token)?;
        store
            .check_session()
            .await
            .map_err(|e| match e {
                OrgDiskError::Auth { message, .. } => OrgDiskError::auth(&user.email, message),
                other => other,
            })?;
        Ok(store)
    }

    async fn export_user(&self, user: &UserRecord, config: &RunConfig) -> Result<RunSummary> {
        let store = self.session(user).await?;
        RunCoordinator::new(store, config.clone())
            .with_shutdown(Arc::clone(&self.shutdown))
            .run(&user.email)
            .await
    }

    async fn purge_user(&self, user: &UserRecord, permanently: bool) -> Result<usize> {
        let store = self.session(user).await?;
        let items = store.list("/").await?;
        info!("[{}] Removing {} top-level items", user.email, items.len());

        let mut results = Vec::with_capacity(items.len());
        for item in &items {
            results.push(store.remove(&item.path, permanently).await);
        }
        Ok(collect_errors(results)?.len())
    }

    fn cancelled(&self, report: &mut BatchReport, user: &UserRecord) -> bool {
        if self.shutdown.is_shutdown_requested() {
            report.push(user, Err(OrgDiskError::Cancelled));
            return true;
        }
        false
    }

    /// Export every user's disk into `<output>/<email>`
    pub async fn download(&self, users: &[UserRecord], config: &RunConfig) -> BatchReport {
        let mut report = BatchReport::start();

        for (n, user) in users.iter().enumerate() {
            if self.cancelled(&mut report, user) {
                continue;
            }
            info!("[{}/{}] Exporting {}", n + 1, users.len(), user.email);

            let result = self.export_user(user, config).await.map(Some);
            report.push(user, result);
        }

        report.finish()
    }

    /// Collect disk usage for every user
    pub async fn info(&self, users: &[UserRecord]) -> (Vec<UsageRow>, BatchReport) {
        let mut report = BatchReport::start();
        let mut rows = Vec::with_capacity(users.len());

        for user in users {
            if self.cancelled(&mut report, user) {
                continue;
            }

            let result = match self.session(user).await {
                Ok(store) => store.disk_usage().await,
                Err(e) => Err(e),
            };
            let result = result.map(|usage| {
                info!("{}: {} MB used", user.email, usage.used_megabytes());
                rows.push(UsageRow {
                    id: user.id.clone(),
                    email: user.email.clone(),
                    size_mb: usage.used_megabytes(),
                });
                None
            });
            report.push(user, result);
        }

        (rows, report.finish())
    }

    /// Remove every top-level item from each user's disk
    pub async fn purge(&self, users: &[UserRecord], permanently: bool) -> BatchReport {
        let mut report = BatchReport::start();

        for user in users {
            if self.cancelled(&mut report, user) {
                continue;
            }

            let result = self.purge_user(user, permanently).await.map(|_| None);
            report.push(user, result);
        }

        report.finish()
    }
}
