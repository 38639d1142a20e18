use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use serde_json::json;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::ingest;
use crate::state::ListenerState;

/// Build the listener router.
///
/// Admin routes are matched first; every other request is treated as an
/// ingestion attempt.
pub fn build_router(state: ListenerState, config: &ServerConfig) -> Router {
    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/admin/logs", get(list_logs_handler).delete(reset_handler))
        .route("/admin/error", get(last_error_handler))
        .route(
            "/admin/status/{code}",
            put(set_status_handler).delete(clear_status_handler),
        )
        .fallback(ingest::ingest)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                ))
                .layer(DefaultBodyLimit::max(config.max_body_bytes)),
        )
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler(State(state): State<ListenerState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// GET /admin/logs: every record received since the last reset
async fn list_logs_handler(State(state): State<ListenerState>) -> impl IntoResponse {
    let records = state.records();
    Json(json!({
        "total": records.len(),
        "records": records,
    }))
}

/// DELETE /admin/logs: clear received records and the recorded error
async fn reset_handler(State(state): State<ListenerState>) -> StatusCode {
    state.reset();
    StatusCode::NO_CONTENT
}

async fn last_error_handler(State(state): State<ListenerState>) -> impl IntoResponse {
    Json(json!({ "error": state.last_error() }))
}

/// PUT /admin/status/{code}: answer subsequent batches with `code`
async fn set_status_handler(
    State(state): State<ListenerState>,
    Path(code): Path<u16>,
) -> Result<StatusCode, ApiError> {
    let status = StatusCode::from_u16(code).map_err(|_| ApiError::InvalidStatus(code))?;
    state.set_status(Some(status));
    tracing::info!(status = code, "Forced ingestion status");
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_status_handler(State(state): State<ListenerState>) -> StatusCode {
    state.set_status(None);
    StatusCode::NO_CONTENT
}
