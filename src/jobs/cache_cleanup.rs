//! Periodic eviction of expired cache entries.

use crate::cache::CacheAdmin;
use crate::jobs::PeriodicJob;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct CacheCleanupJob {
    cache: CacheAdmin,
    interval: Duration,
}

impl CacheCleanupJob {
    pub fn new(cache: CacheAdmin, interval: Duration) -> Self {
        Self { cache, interval }
    }
}

#[async_trait]
impl PeriodicJob for CacheCleanupJob {
    fn name(&self) -> &'static str {
        "Cache Cleanup Service"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    // The cache is empty of expired rows right after startup more often
    // than not, so the first sweep waits a full interval.
    fn startup_delay(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, _cancel: &CancellationToken) -> Result<()> {
        let stats = self.cache.statistics()?;
        info!(
            "{}: {} entries ({} active, {} expired, {} bytes)",
            self.name(),
            stats.total_entries,
            stats.active_entries,
            stats.expired_entries,
            stats.total_size_bytes
        );

        if stats.expired_entries > 0 {
            self.cache.clear_expired()?;
        } else {
            debug!("{}: nothing to evict", self.name());
        }
        Ok(())
    }
}
