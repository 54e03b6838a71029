//! HTTP surface.
//!
//! Thin axum handlers over [`Translator`]; every decision lives in the
//! orchestrator.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{ApprovalError, ValidationError};
use crate::metrics::{EngineMetrics, MetricsReport};
use crate::orchestrator::{
    ApproveRequest, ChatCompletionRequest, ChatCompletionResponse, TranslateRequest,
    TranslateResponse, Translator,
};
use crate::store::MemoryEntry;

pub type AppState = Arc<Translator>;

/// Error body returned to HTTP callers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ApprovalError> for ApiError {
    fn from(e: ApprovalError) -> Self {
        match e {
            ApprovalError::Validation(e) => e.into(),
            ApprovalError::Store(e) => {
                error!(error = %e, "Failed to record approval");
                ApiError::Internal("failed to record approval".to_string())
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub ok: bool,
    pub entry: MemoryEntry,
}

async fn translate(
    State(translator): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    Ok(Json(translator.translate(request).await?))
}

async fn approve(
    State(translator): State<AppState>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let entry = translator.approve(request).await?;
    Ok(Json(ApproveResponse { ok: true, entry }))
}

async fn chat_completions(
    State(translator): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, ApiError> {
    Ok(Json(translator.translate_batch(request).await?))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics() -> Json<MetricsReport> {
    Json(EngineMetrics::global().report())
}

pub fn router(translator: AppState) -> Router {
    Router::new()
        .route("/api/translate", post(translate))
        .route("/api/translate/approve", post(approve))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(translator)
}

/// Bind `0.0.0.0:port` and serve until the process stops.
pub async fn serve(translator: AppState, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;
    info!(port, "termguard listening");

    axum::serve(listener, router(translator))
        .await
        .context("HTTP server stopped")
}
