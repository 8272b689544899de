//! End-to-end tests for the admin HTTP API.
//!
//! Each test spawns the real axum server on an ephemeral port and talks
//! to it with a plain HTTP client.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use inkportal_server::cache::{CacheAdmin, CacheRow, CacheStore, SqliteCacheStore};
use inkportal_server::display::{Display, DisplayStore, SqliteDisplayStore};
use inkportal_server::jobs::{ImageRegenerationRequest, WorkProcessor, WorkQueue};
use inkportal_server::server::{make_router, AppState};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Processor that parks every request until shutdown, keeping keys
/// visibly in flight.
struct ParkedProcessor;

#[async_trait]
impl WorkProcessor<ImageRegenerationRequest> for ParkedProcessor {
    fn service_name(&self) -> &'static str {
        "Image Regeneration Service"
    }

    async fn process(
        &self,
        _request: ImageRegenerationRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

struct TestServer {
    base_url: String,
    displays: Arc<SqliteDisplayStore>,
    cache_store: Arc<SqliteCacheStore>,
    cancel: CancellationToken,
    _dir: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let dir = TempDir::new().unwrap();
        let displays = Arc::new(SqliteDisplayStore::new(dir.path().join("portal.db")).unwrap());
        let cache_store = Arc::new(SqliteCacheStore::new(dir.path().join("cache.db")).unwrap());

        let cancel = CancellationToken::new();
        let (queue, _handle) = WorkQueue::spawn(Arc::new(ParkedProcessor), cancel.child_token());

        let state = AppState {
            displays: displays.clone(),
            cache: CacheAdmin::new(cache_store.clone()),
            regeneration_queue: queue,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = cancel.child_token();
        tokio::spawn(async move {
            axum::serve(listener, make_router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            displays,
            cache_store,
            cancel,
            _dir: dir,
        }
    }

    fn seed_display(&self, id: i64) {
        self.displays
            .upsert_display(&Display {
                id,
                name: format!("display-{}", id),
                width: 800,
                height: 480,
                rotation: 0,
            })
            .unwrap();
    }

    fn seed_cache_entry(&self, creator: &str, key: &str, expires_in: ChronoDuration) {
        let now = Utc::now();
        self.cache_store
            .upsert(&CacheRow {
                creator: creator.to_string(),
                key: key.to_string(),
                data: "{}".to_string(),
                created_at: now,
                expires_at: now + expires_in,
            })
            .unwrap();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_status_reports_displays_and_queue_depth() {
    let server = TestServer::spawn().await;
    server.seed_display(1);

    let body: serde_json::Value = reqwest::get(format!("{}/status", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Default display plus the seeded one.
    assert_eq!(body["displays"], 2);
    assert_eq!(body["active_regenerations"], 0);
}

#[tokio::test]
async fn test_cache_stats_and_entries() {
    let server = TestServer::spawn().await;
    server.seed_cache_entry("weather", "a", ChronoDuration::minutes(5));
    server.seed_cache_entry("weather", "b", ChronoDuration::minutes(-5));

    let stats: serde_json::Value = reqwest::get(format!("{}/cache/stats", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_entries"], 2);
    assert_eq!(stats["expired_entries"], 1);
    assert_eq!(stats["creators"][0]["creator"], "weather");

    let entries: serde_json::Value =
        reqwest::get(format!("{}/cache/entries?limit=10", server.base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(entries["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cache_clear_scopes() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    server.seed_cache_entry("weather", "a", ChronoDuration::minutes(-5));
    server.seed_cache_entry("weather", "b", ChronoDuration::minutes(5));
    server.seed_cache_entry("holidays", "c", ChronoDuration::minutes(5));

    let body: serde_json::Value = client
        .post(format!("{}/cache/clear?scope=expired", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted"], 1);

    let body: serde_json::Value = client
        .post(format!("{}/cache/clear?scope=holidays", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted"], 1);

    let body: serde_json::Value = client
        .post(format!("{}/cache/clear", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted"], 1);
}

#[tokio::test]
async fn test_regenerate_dedupes_repeated_requests() {
    let server = TestServer::spawn().await;
    server.seed_display(5);
    let client = reqwest::Client::new();
    let url = format!("{}/displays/5/regenerate", server.base_url);

    let first = client.post(&url).send().await.unwrap();
    assert_eq!(first.status(), 202);
    let body: serde_json::Value = first.json().await.unwrap();
    assert_eq!(body["enqueued"], true);

    // The processor parks the request, so a second trigger folds into
    // the pending one.
    let second = client.post(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["enqueued"], false);
}

#[tokio::test]
async fn test_regenerate_unknown_display_is_404() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/displays/99/regenerate", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
