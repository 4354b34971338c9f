//! Concierge HTTP REST API
//!
//! Axum-based HTTP server exposing the chat orchestrator and its info/admin
//! operations. Runs alongside the Unix socket IPC server on port 8000
//! (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`; the inner functions are tested
//! directly as well as through the router.
//!
//! Endpoints:
//! - POST /chat           — one conversational turn
//! - GET  /health         — per-collaborator health, `healthy` or `degraded`
//! - GET  /version        — server version info
//! - GET  /contact        — contact directory
//! - GET  /services       — service catalogue
//! - GET  /stats          — session and catalogue counts
//! - POST /admin/cleanup  — purge expired sessions
//! - POST /admin/reindex  — embed and upsert website chunks

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use concierge_core::ipc::{ChunkInput, ConciergeRequest, ConciergeResponse};
use concierge_core::ConciergeConfig;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::subsystems::orchestrator::Concierge;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub concierge: Arc<Concierge>,
    pub config: ConciergeConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/contact", get(contact_handler))
        .route("/services", get(services_handler))
        .route("/stats", get(stats_handler))
        .route("/admin/cleanup", post(cleanup_handler))
        .route("/admin/reindex", post(reindex_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    concierge: Arc<Concierge>,
    config: ConciergeConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { concierge, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Concierge HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReindexRequest {
    #[serde(default)]
    pub chunks: Vec<ChunkInput>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn into_value(self) -> serde_json::Value {
        serde_json::json!({ "error": self.error, "status": self.status })
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

async fn dispatch(concierge: &Concierge, request: ConciergeRequest) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, concierge).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e).into_value(),
        ),
    }
}

/// Inner chat — validates the message and runs one turn.
pub async fn chat_inner(
    concierge: &Concierge,
    max_message_chars: usize,
    req: ChatRequest,
) -> (StatusCode, serde_json::Value) {
    let message = req.message.unwrap_or_default();
    if let Err(e) = crate::router::validate_message(&message, max_message_chars) {
        return (StatusCode::BAD_REQUEST, ErrorResponse::new(e).into_value());
    }

    let start = Instant::now();
    let (status, mut body) = dispatch(
        concierge,
        ConciergeRequest::Chat {
            message,
            session_id: req.session_id,
        },
    )
    .await;

    tracing::debug!(took_ms = start.elapsed().as_millis() as u64, "Chat turn served");
    if status == StatusCode::OK {
        if let Some(obj) = body.as_object_mut() {
            obj.insert(
                "took_ms".to_string(),
                serde_json::json!(start.elapsed().as_millis() as u64),
            );
        }
    }
    (status, body)
}

/// Inner health — checks every collaborator.
pub async fn health_inner(concierge: &Concierge, socket_path: &str) -> (StatusCode, serde_json::Value) {
    let report = concierge.health().await;
    (
        StatusCode::OK,
        serde_json::json!({
            "status": report.status,
            "version": env!("CARGO_PKG_VERSION"),
            "services": report.services,
            "socket": socket_path,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "concierge/1",
    })
}

pub async fn contact_inner(concierge: &Concierge) -> (StatusCode, serde_json::Value) {
    dispatch(concierge, ConciergeRequest::Contacts).await
}

pub async fn services_inner(concierge: &Concierge) -> (StatusCode, serde_json::Value) {
    dispatch(concierge, ConciergeRequest::Services).await
}

pub async fn stats_inner(concierge: &Concierge) -> (StatusCode, serde_json::Value) {
    dispatch(concierge, ConciergeRequest::Stats).await
}

pub async fn cleanup_inner(concierge: &Concierge) -> (StatusCode, serde_json::Value) {
    dispatch(concierge, ConciergeRequest::PurgeSessions).await
}

pub async fn reindex_inner(concierge: &Concierge, req: ReindexRequest) -> (StatusCode, serde_json::Value) {
    if req.chunks.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("chunks must not be empty").into_value(),
        );
    }
    dispatch(concierge, ConciergeRequest::Reindex { chunks: req.chunks }).await
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) =
        chat_inner(&state.concierge, state.config.service.max_message_chars, req).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.concierge, &state.config.service.socket_path).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn contact_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = contact_inner(&state.concierge).await;
    (status, Json(body))
}

pub async fn services_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = services_inner(&state.concierge).await;
    (status, Json(body))
}

pub async fn stats_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = stats_inner(&state.concierge).await;
    (status, Json(body))
}

pub async fn cleanup_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = cleanup_inner(&state.concierge).await;
    (status, Json(body))
}

pub async fn reindex_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ReindexRequest>,
) -> impl IntoResponse {
    let (status, body) = reindex_inner(&state.concierge, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `ConciergeResponse` into an HTTP body value, or an error string.
pub fn response_to_http(
    response: ConciergeResponse,
) -> std::result::Result<serde_json::Value, String> {
    if response.status == "ok" {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
