use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::AgentError;
use crate::queue::WorkQueue;
use crate::scope::resolve_scope;
use crate::types::ScanRequest;

#[derive(Clone)]
pub struct AppState {
    queue: Arc<WorkQueue>,
}

/// HTTP control API:
///
/// - `POST /api/scan` `{ "target": "example.com", "focus": "api.example.com" }`
/// - `GET /api/status`
pub fn router(queue: Arc<WorkQueue>) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .with_state(AppState { queue });

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

/// Serve the control API on `bind` until `cancel` fires.
pub async fn spawn_server(bind: &str, queue: Arc<WorkQueue>, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("control API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(queue))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.queue.status()))
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    // Reject bad scopes up front rather than failing later in the worker.
    if let Err(e) = resolve_scope(&req) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match app.queue.enqueue(req) {
        Ok(()) => (StatusCode::ACCEPTED, Json(app.queue.status())).into_response(),
        Err(e @ AgentError::Queue(_)) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
