//! Operator HTTP surface: queue status, cache administration and
//! manual regeneration triggers.

use crate::cache::CacheAdmin;
use crate::display::DisplayStore;
use crate::jobs::{ImageRegenerationRequest, WorkQueue};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub displays: Arc<dyn DisplayStore>,
    pub cache: CacheAdmin,
    pub regeneration_queue: WorkQueue<ImageRegenerationRequest>,
}

/// Internal errors surface as plain 500s; details go to the log only.
struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal server error"})),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

pub fn make_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/entries", get(cache_entries))
        .route("/cache/clear", post(cache_clear))
        .route("/displays/{display_id}/regenerate", post(regenerate_display))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until the cancellation token fires.
pub async fn run_server(
    state: AppState,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Admin API listening on {}", addr);

    axum::serve(listener, make_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let displays = state.displays.list_displays()?;
    Ok(Json(json!({
        "displays": displays.len(),
        "active_regenerations": state.regeneration_queue.active_count(),
    })))
}

async fn cache_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.cache.statistics()?;
    Ok(Json(serde_json::to_value(stats).map_err(anyhow::Error::from)?))
}

#[derive(Deserialize)]
struct EntriesParams {
    limit: Option<usize>,
}

async fn cache_entries(
    State(state): State<AppState>,
    Query(params): Query<EntriesParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state.cache.entries(params.limit.unwrap_or(100))?;
    Ok(Json(json!({ "entries": entries })))
}

#[derive(Deserialize)]
struct ClearParams {
    /// "all" (default), "expired", or a creator namespace.
    scope: Option<String>,
}

async fn cache_clear(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scope = params.scope.unwrap_or_else(|| "all".to_string());
    let deleted = match scope.as_str() {
        "all" => state.cache.clear_all()?,
        "expired" => state.cache.clear_expired()?,
        creator => state.cache.clear_by_creator(creator)?,
    };
    Ok(Json(json!({ "deleted": deleted })))
}

async fn regenerate_display(
    State(state): State<AppState>,
    Path(display_id): Path<i64>,
) -> Result<Response, ApiError> {
    if state.displays.get_display(display_id)?.is_none() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "display not found"})),
        )
            .into_response());
    }

    let enqueued = state
        .regeneration_queue
        .enqueue(ImageRegenerationRequest::new(display_id));
    let status = if enqueued {
        StatusCode::ACCEPTED
    } else {
        // Already queued or executing; the pending run covers this
        // request too.
        StatusCode::OK
    };
    Ok((status, Json(json!({ "enqueued": enqueued }))).into_response())
}
