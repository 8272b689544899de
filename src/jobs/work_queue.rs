//! Deduplicating asynchronous work queue.
//!
//! Producers hand requests to [`WorkQueue::enqueue`] without blocking;
//! a single consumer task processes them in FIFO order. A request whose
//! deduplication key is already enqueued or executing is rejected as a
//! no-op, so repeated submissions of the same logical unit of work
//! collapse into one execution.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A unit of work with an identity.
pub trait WorkRequest: Send + 'static {
    /// Key identifying "the same logical unit of work" across repeated
    /// submissions. Must be non-empty.
    fn dedup_key(&self) -> String;

    /// When the request was created.
    fn requested_at(&self) -> DateTime<Utc>;
}

/// The processing hook executed by the queue's consumer task.
#[async_trait]
pub trait WorkProcessor<R: WorkRequest>: Send + Sync + 'static {
    /// Queue name for logging.
    fn service_name(&self) -> &'static str;

    /// Process a single request. Errors are logged by the queue and the
    /// request is not retried; a future submission starts fresh.
    async fn process(&self, request: R, cancel: &CancellationToken) -> Result<()>;
}

type ActiveSet = Arc<Mutex<HashMap<String, DateTime<Utc>>>>;

/// Handle to a deduplicating work queue. Cheap to clone; all clones
/// feed the same consumer.
pub struct WorkQueue<R> {
    name: &'static str,
    tx: mpsc::UnboundedSender<R>,
    active: ActiveSet,
}

impl<R> Clone for WorkQueue<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<R: WorkRequest> WorkQueue<R> {
    /// Start the consumer task and return the queue handle together
    /// with the consumer's join handle. The consumer exits when the
    /// cancellation token fires; requests still queued at that point
    /// are dropped without processing.
    pub fn spawn<P>(processor: Arc<P>, cancel: CancellationToken) -> (Self, JoinHandle<()>)
    where
        P: WorkProcessor<R>,
    {
        let name = processor.service_name();
        let (tx, rx) = mpsc::unbounded_channel();
        let active: ActiveSet = Arc::new(Mutex::new(HashMap::new()));

        let queue = Self {
            name,
            tx,
            active: Arc::clone(&active),
        };
        let handle = tokio::spawn(run_consumer(name, rx, active, processor, cancel));
        (queue, handle)
    }

    /// Enqueue a request for processing.
    ///
    /// Returns `false` without queuing when a request with the same key
    /// is already enqueued or executing, or when the queue is shutting
    /// down. Neither case is an error.
    pub fn enqueue(&self, request: R) -> bool {
        let key = request.dedup_key();
        if key.is_empty() {
            warn!("{}: rejected request with empty deduplication key", self.name);
            return false;
        }

        // Claim the key before touching the channel: the insert-if-absent
        // is the only synchronization between producers and the consumer.
        {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(&key) {
                debug!("{}: request {} is already in progress, skipping", self.name, key);
                return false;
            }
            active.insert(key.clone(), request.requested_at());
        }

        if self.tx.send(request).is_err() {
            // Consumer is gone, shutdown in progress.
            self.active.lock().unwrap().remove(&key);
            warn!("{}: failed to enqueue request {} (queue closed)", self.name, key);
            return false;
        }

        info!("{}: enqueued request {}", self.name, key);
        true
    }

    /// Whether a request with this key is currently enqueued or
    /// executing.
    pub fn is_processing(&self, key: &str) -> bool {
        self.active.lock().unwrap().contains_key(key)
    }

    /// Number of requests currently enqueued or executing.
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

async fn run_consumer<R, P>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<R>,
    active: ActiveSet,
    processor: Arc<P>,
    cancel: CancellationToken,
) where
    R: WorkRequest,
    P: WorkProcessor<R>,
{
    info!("{} started", name);

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(request) => request,
                None => break,
            },
        };

        let key = request.dedup_key();
        let requested_at = request.requested_at();
        let started = Instant::now();

        info!("{}: starting processing request {}", name, key);
        match processor.process(request, &cancel).await {
            Ok(()) => info!(
                "{}: successfully processed request {} (took {} ms since request, {} ms real time)",
                name,
                key,
                (Utc::now() - requested_at).num_milliseconds(),
                started.elapsed().as_millis()
            ),
            Err(e) => error!("{}: error processing request {}: {:#}", name, key, e),
        }

        // The key stays claimed for the full enqueue-to-completion
        // interval and is released here no matter how processing ended.
        active.lock().unwrap().remove(&key);
    }

    info!("{} stopped", name);
}
