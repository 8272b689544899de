//! Get-or-compute handle over the cache store.

use super::store::{CacheRow, CacheStore};
use anyhow::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A namespaced get-or-compute cache.
///
/// Each integration service owns one handle bound to its creator
/// namespace. There is deliberately no cross-caller locking: two
/// concurrent callers missing on the same key both recompute and the
/// last writer wins. Cached values are idempotent recomputations, so a
/// double compute costs one redundant call, which is cheaper than
/// serializing every lookup.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn CacheStore>,
    creator: String,
    minimal_expiry: Option<Duration>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn CacheStore>, creator: impl Into<String>) -> Self {
        Self {
            store,
            creator: creator.into(),
            minimal_expiry: None,
        }
    }

    /// Enforce a lower bound on the expiry of every value written
    /// through this handle.
    pub fn with_minimal_expiry(mut self, minimal: Duration) -> Self {
        self.minimal_expiry = Some(minimal);
        self
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// Return the cached value for `key_params` if a fresh one exists,
    /// otherwise await `compute`, store its result for `ttl`, and
    /// return it.
    ///
    /// A failure inside `compute` propagates to the caller untouched
    /// and leaves the cache unchanged. A row that no longer
    /// deserializes is treated as a miss, never as an error.
    pub async fn get_or_set<T, K, F, Fut>(
        &self,
        compute: F,
        key_params: &K,
        ttl: Duration,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        K: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key_json = serde_json::to_string(key_params)?;
        let key_digest = sha256_hex(&key_json);
        let now = Utc::now();

        if let Some(row) = self.store.get_fresh(&self.creator, &key_digest, now)? {
            match serde_json::from_str::<T>(&row.data) {
                Ok(value) => {
                    debug!(
                        "[{}][key_json={}] returning cached data (expires in {}s, at {})",
                        self.creator,
                        key_json,
                        (row.expires_at - now).num_seconds(),
                        row.expires_at
                    );
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        "[{}][key_json={}] failed to deserialize cached data, will recalculate: {}",
                        self.creator, key_json, e
                    );
                }
            }
        }

        info!("[{}][key_json={}] recalculating fresh data", self.creator, key_json);
        let fresh = compute().await?;

        debug!("[{}][key_json={}] storing serialized data", self.creator, key_json);
        let data = serde_json::to_string(&fresh)?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        self.store.upsert(&CacheRow {
            creator: self.creator.clone(),
            key: key_digest.clone(),
            data,
            created_at: now,
            expires_at: now + ttl,
        })?;

        if let Some(minimal) = self.minimal_expiry {
            let minimal = chrono::Duration::from_std(minimal)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
            self.store
                .bump_expiry(&self.creator, &key_digest, now + minimal)?;
        }

        Ok(fresh)
    }

    /// Drop every row owned by this namespace.
    pub fn clear(&self) -> Result<usize> {
        info!("Clearing cached data for {}", self.creator);
        self.store.delete_by_creator(&self.creator)
    }
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
