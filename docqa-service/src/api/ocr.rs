//! OCR job endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::Document;
use crate::error::ServiceError;
use crate::progress::Job;
use crate::service::OcrAccepted;

use super::AppState;
use super::caller::Caller;
use super::documents::LanguageParams;

/// Response for a cancellation request
#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Queue OCR for a document
pub async fn start_ocr_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Query(params): Query<LanguageParams>,
) -> Result<(StatusCode, Json<OcrAccepted>), ServiceError> {
    let accepted = state
        .service
        .start_ocr(&id, &caller.user_id, params.lang.as_deref())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Current OCR job state; unknown documents read as idle
pub async fn ocr_status_handler(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Json<Job> {
    Json(state.service.ocr_status(&id))
}

/// Cancel the running OCR job of a document
pub async fn cancel_ocr_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ServiceError> {
    state.service.get_document(&id, &caller.user_id)?;
    Ok(Json(CancelResponse {
        cancelled: state.service.cancel_ocr(&id),
    }))
}

/// Drop the extracted text of a document
pub async fn clear_ocr_text_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    let document = state.service.clear_extracted_text(&id, &caller.user_id)?;
    Ok(Json(document))
}
