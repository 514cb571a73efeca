//! Request pacing toward the remote API
//!
//! Enforces a minimum interval between consecutive calls using a
//! token-bucket limiter from the Governor crate with a burst of one.
//! All clones share the same bucket, so the ceiling holds no matter how
//! many callers draw from it.

use crate::core::Shutdown;
use crate::error::{OrgDiskError, Result};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Default delay between listing calls
pub const DEFAULT_CRAWL_DELAY: Duration = Duration::from_millis(100);

/// Fixed-interval limiter for remote calls
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    interval: Duration,
}

impl RequestPacer {
    /// Allow at most one call per `interval`
    ///
    /// A zero interval disables pacing.
    ///
    /// # Example
    /// ```
    /// use orgdisk::core::RequestPacer;
    /// use std::time::Duration;
    /// let pacer = RequestPacer::new(Duration::from_millis(100)); // 10 calls/s
    /// assert!(pacer.is_enabled());
    /// ```
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| quota.allow_burst(NonZeroU32::MIN))
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        Self { limiter, interval }
    }

    /// Pacer that never waits
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Whether calls are being paced
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Wait until the next call may be issued
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Wait for the next slot, giving up if shutdown is requested first
    pub async fn until_ready_or_cancelled(&self, shutdown: &Shutdown) -> Result<()> {
        if shutdown.is_shutdown_requested() {
            return Err(OrgDiskError::Cancelled);
        }

        tokio::select! {
            _ = self.until_ready() => Ok(()),
            _ = shutdown.wait_for_shutdown() => Err(OrgDiskError::Cancelled),
        }
    }

    /// Try to take a slot without waiting
    pub fn try_acquire(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("interval", &self.interval)
            .finish()
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(DEFAULT_CRAWL_DELAY)
    }
}
