//! Periodic cleanup of expired refresh records and rate-limit buckets.

use crate::engine::{rate_limit::RateLimiter, store::RefreshTokenStore};
use chrono::{Duration as ChronoDuration, Utc};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A token family is purged once its newest member has been expired this
/// long. Until then a replay of any rotated member still revokes the family.
pub const EXPIRED_RETENTION_HOURS: i64 = 24;

pub struct Housekeeping {
    store: Arc<dyn RefreshTokenStore>,
    limiter: Arc<dyn RateLimiter>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub purged_tokens: u64,
    pub evicted_buckets: usize,
}

impl Housekeeping {
    #[must_use]
    pub fn new(store: Arc<dyn RefreshTokenStore>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { store, limiter }
    }

    /// Run one cleanup pass.
    ///
    /// # Errors
    /// Returns the store error if purging fails; bucket eviction still runs.
    pub async fn sweep(&self) -> anyhow::Result<SweepReport> {
        let evicted_buckets = self.limiter.evict_expired();
        let purged_tokens = self
            .store
            .purge_expired(Utc::now() - ChronoDuration::hours(EXPIRED_RETENTION_HOURS))
            .await?;
        Ok(SweepReport {
            purged_tokens,
            evicted_buckets,
        })
    }

    /// Sweep every `period` until the task is aborted.
    #[must_use]
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        info!(period_seconds = period.as_secs(), "starting housekeeping task");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match self.sweep().await {
                    Ok(report) => debug!(
                        purged_tokens = report.purged_tokens,
                        evicted_buckets = report.evicted_buckets,
                        "housekeeping sweep finished"
                    ),
                    Err(err) => error!("housekeeping sweep failed: {err:#}"),
                }
            }
        })
    }
}
