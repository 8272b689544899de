//! Bulk cache administration.

use super::store::{CacheEntryInfo, CacheStatistics, CacheStore};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Administrative operations over every cache namespace at once. Used
/// by the cleanup trigger and the operator endpoints.
#[derive(Clone)]
pub struct CacheAdmin {
    store: Arc<dyn CacheStore>,
}

impl CacheAdmin {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn statistics(&self) -> Result<CacheStatistics> {
        self.store.statistics(Utc::now())
    }

    pub fn clear_all(&self) -> Result<usize> {
        info!("Clearing all database caches");
        let deleted = self.store.delete_all()?;
        info!("Deleted {} cache entries", deleted);
        Ok(deleted)
    }

    pub fn clear_by_creator(&self, creator: &str) -> Result<usize> {
        info!("Clearing database cache for creator: {}", creator);
        let deleted = self.store.delete_by_creator(creator)?;
        info!("Deleted {} cache entries for {}", deleted, creator);
        Ok(deleted)
    }

    pub fn clear_expired(&self) -> Result<usize> {
        let deleted = self.store.delete_expired(Utc::now())?;
        info!("Deleted {} expired cache entries", deleted);
        Ok(deleted)
    }

    pub fn entries(&self, limit: usize) -> Result<Vec<CacheEntryInfo>> {
        self.store.entries(limit, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheRow, SqliteCacheStore};
    use chrono::Duration;
    use tempfile::TempDir;

    fn make_admin() -> (TempDir, Arc<SqliteCacheStore>, CacheAdmin) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteCacheStore::new(dir.path().join("cache.db")).unwrap());
        let admin = CacheAdmin::new(store.clone());
        (dir, store, admin)
    }

    fn seed(store: &SqliteCacheStore, creator: &str, key: &str, expires_in: Duration) {
        let now = Utc::now();
        store
            .upsert(&CacheRow {
                creator: creator.to_string(),
                key: key.to_string(),
                data: "{}".to_string(),
                created_at: now,
                expires_at: now + expires_in,
            })
            .unwrap();
    }

    #[test]
    fn test_clear_expired_removes_only_expired() {
        let (_dir, store, admin) = make_admin();
        seed(&store, "weather", "dead", Duration::seconds(-5));
        seed(&store, "weather", "live", Duration::seconds(60));

        let before = admin.statistics().unwrap();
        assert_eq!(before.total_entries, before.active_entries + before.expired_entries);

        assert_eq!(admin.clear_expired().unwrap(), 1);

        let after = admin.statistics().unwrap();
        assert_eq!(after.total_entries, 1);
        assert_eq!(after.expired_entries, 0);
    }

    #[test]
    fn test_clear_all_and_by_creator() {
        let (_dir, store, admin) = make_admin();
        seed(&store, "weather", "a", Duration::seconds(60));
        seed(&store, "holidays", "b", Duration::seconds(60));

        assert_eq!(admin.clear_by_creator("weather").unwrap(), 1);
        assert_eq!(admin.statistics().unwrap().total_entries, 1);

        assert_eq!(admin.clear_all().unwrap(), 1);
        assert_eq!(admin.statistics().unwrap().total_entries, 0);
    }
}
