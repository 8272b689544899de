//! Background job infrastructure and the concrete portal jobs.
//!
//! Two generic primitives carry all background work: a deduplicating
//! work queue (at most one in-flight request per key) and a periodic
//! trigger (fixed-interval ticks with per-tick failure isolation). The
//! concrete jobs compose them: the bitmap generation trigger feeds the
//! image regeneration queue, the cache cleanup trigger drives cache
//! administration, and the missed-connections detector watches display
//! liveness.

mod bitmap_generation;
mod cache_cleanup;
mod image_regen;
mod missed_connections;
mod periodic;
mod work_queue;

pub use bitmap_generation::BitmapGenerationJob;
pub use cache_cleanup::CacheCleanupJob;
pub use image_regen::{regeneration_key, ImageRegenerationProcessor, ImageRegenerationRequest};
pub use missed_connections::MissedConnectionsJob;
pub use periodic::{spawn_periodic, PeriodicJob};
pub use work_queue::{WorkProcessor, WorkQueue, WorkRequest};
