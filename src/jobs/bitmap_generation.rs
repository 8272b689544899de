//! Periodic trigger that keeps rendered images fresh.
//!
//! Every cycle it asks the regeneration queue to redo every real
//! display. The queue's deduplication absorbs the overlap when a
//! previous regeneration is still running.

use crate::display::DisplayStore;
use crate::jobs::{ImageRegenerationRequest, PeriodicJob, WorkQueue};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct BitmapGenerationJob {
    displays: Arc<dyn DisplayStore>,
    queue: WorkQueue<ImageRegenerationRequest>,
    interval: Duration,
}

impl BitmapGenerationJob {
    pub fn new(
        displays: Arc<dyn DisplayStore>,
        queue: WorkQueue<ImageRegenerationRequest>,
        interval: Duration,
    ) -> Self {
        Self {
            displays,
            queue,
            interval,
        }
    }
}

#[async_trait]
impl PeriodicJob for BitmapGenerationJob {
    fn name(&self) -> &'static str {
        "Bitmap Generation Service"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, _cancel: &CancellationToken) -> Result<()> {
        let mut enqueued = 0usize;
        let mut skipped = 0usize;

        for display in self.displays.list_displays()? {
            if display.is_default() {
                continue;
            }
            if self.queue.enqueue(ImageRegenerationRequest::new(display.id)) {
                enqueued += 1;
            } else {
                skipped += 1;
            }
        }

        info!(
            "{}: requested regeneration for {} displays ({} already in progress)",
            self.name(),
            enqueued,
            skipped
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{Display, SqliteDisplayStore};
    use crate::jobs::{regeneration_key, WorkProcessor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct BlockedProcessor {
        started: AtomicUsize,
    }

    #[async_trait]
    impl WorkProcessor<ImageRegenerationRequest> for BlockedProcessor {
        fn service_name(&self) -> &'static str {
            "Image Regeneration Service"
        }

        async fn process(
            &self,
            _request: ImageRegenerationRequest,
            cancel: &CancellationToken,
        ) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn seeded_store(dir: &TempDir, ids: &[i64]) -> Arc<SqliteDisplayStore> {
        let store = Arc::new(SqliteDisplayStore::new(dir.path().join("portal.db")).unwrap());
        for &id in ids {
            store
                .upsert_display(&Display {
                    id,
                    name: format!("display-{}", id),
                    width: 800,
                    height: 480,
                    rotation: 0,
                })
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_enqueues_every_real_display_skipping_the_default() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[1, 2, 3]);

        let cancel = CancellationToken::new();
        let (queue, handle) = WorkQueue::spawn(
            Arc::new(BlockedProcessor {
                started: AtomicUsize::new(0),
            }),
            cancel.clone(),
        );

        let job = BitmapGenerationJob::new(store, queue.clone(), Duration::from_secs(60));
        job.execute(&cancel).await.unwrap();

        assert_eq!(queue.active_count(), 3);
        assert!(queue.is_processing(&regeneration_key(1)));
        assert!(queue.is_processing(&regeneration_key(2)));
        assert!(queue.is_processing(&regeneration_key(3)));
        assert!(!queue.is_processing(&regeneration_key(0)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_second_cycle_tolerates_requests_still_in_flight() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[1, 2]);

        let cancel = CancellationToken::new();
        let (queue, handle) = WorkQueue::spawn(
            Arc::new(BlockedProcessor {
                started: AtomicUsize::new(0),
            }),
            cancel.clone(),
        );

        let job = BitmapGenerationJob::new(store, queue.clone(), Duration::from_secs(60));
        job.execute(&cancel).await.unwrap();
        // Nothing completed yet, so the second cycle enqueues nothing
        // new and must still succeed.
        job.execute(&cancel).await.unwrap();

        assert_eq!(queue.active_count(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
