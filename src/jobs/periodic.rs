//! Fixed-interval background job runner.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Work executed on a fixed cadence.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Job name for logging.
    fn name(&self) -> &'static str;

    /// Time between the end of one tick and the start of the next.
    fn interval(&self) -> Duration;

    /// One-off delay before the first tick.
    fn startup_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// One tick of work. An error is logged and the next tick still
    /// runs after the full interval.
    async fn execute(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Run the job's tick loop on a dedicated task until the token fires.
pub fn spawn_periodic<J: PeriodicJob>(job: Arc<J>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "{} started (running every {:?})",
            job.name(),
            job.interval()
        );

        let startup_delay = job.startup_delay();
        if !startup_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("{} stopped", job.name());
                    return;
                }
                _ = tokio::time::sleep(startup_delay) => {}
            }
        }

        while !cancel.is_cancelled() {
            if let Err(e) = job.execute(&cancel).await {
                error!("Error in {}: {:#}", job.name(), e);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(job.interval()) => {}
            }
        }

        info!("{} stopped", job.name());
    })
}
