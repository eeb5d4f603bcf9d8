//! HTTP API for the document Q/A service.
//!
//! This module provides the REST API endpoints for:
//! - Health monitoring
//! - Document upload and management
//! - OCR jobs and their progress
//! - LLM sessions over extracted text

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, post, put},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::DocQaService;

pub mod caller;
pub mod documents;
pub mod llm;
pub mod ocr;
use documents::{
    delete_document_handler, get_document_file_handler, get_document_handler,
    list_documents_handler, replace_document_file_handler, upload_document_handler,
    upload_with_ocr_handler,
};
use llm::{append_turn_handler, initialize_session_handler, latest_session_handler};
use ocr::{cancel_ocr_handler, clear_ocr_text_handler, ocr_status_handler, start_ocr_handler};

/// Application state
pub struct AppState {
    pub service: Arc<DocQaService>,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<DocQaService>) -> Router {
    // Multipart framing needs a little room above the file itself
    let max_body_size = service.config.limits.max_upload_bytes as usize + 64 * 1024;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        // Document endpoints - with larger body limit for file uploads
        .route("/documents", get(list_documents_handler))
        .route(
            "/documents",
            post(upload_document_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/documents/with-ocr/async",
            post(upload_with_ocr_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/documents/{id}", get(get_document_handler))
        .route("/documents/{id}", delete(delete_document_handler))
        .route("/documents/{id}/file", get(get_document_file_handler))
        .route(
            "/documents/{id}/file",
            put(replace_document_file_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        // OCR endpoints
        .route("/documents/{id}/ocr", post(start_ocr_handler))
        .route("/documents/{id}/ocr", delete(cancel_ocr_handler))
        .route("/documents/{id}/ocr/status", get(ocr_status_handler))
        .route("/documents/{id}/ocr/text", delete(clear_ocr_text_handler))
        // LLM session endpoints
        .route(
            "/documents/{id}/llm/initialize",
            post(initialize_session_handler),
        )
        .route("/documents/{id}/llm/session", get(latest_session_handler))
        .route(
            "/documents/{id}/llm/{session_id}/answer",
            post(append_turn_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}
