//! Persisted TTL cache for integration data.
//!
//! Integration services (weather, holidays, page rendering helpers)
//! wrap their expensive calls in [`TtlCache::get_or_set`]; the results
//! live in a shared SQLite table, one namespace ("creator") per
//! integration, each row carrying an absolute expiry.

mod admin;
mod store;
mod ttl;

pub use admin::CacheAdmin;
pub use store::{
    CacheEntryInfo, CacheRow, CacheStatistics, CacheStore, CreatorStats, SqliteCacheStore,
};
pub use ttl::TtlCache;
