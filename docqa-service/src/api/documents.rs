//! Document API endpoints.
//!
//! Handlers for upload, listing, lookup, file access and deletion.

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::db::Document;
use crate::error::ServiceError;
use crate::service::OcrAccepted;

use super::AppState;
use super::caller::Caller;

/// OCR language query parameter
#[derive(Debug, Deserialize)]
pub struct LanguageParams {
    pub lang: Option<String>,
}

/// Query of the file endpoint; `download=1` asks for an attachment
#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub download: Option<String>,
}

impl FileParams {
    fn disposition(&self) -> &'static str {
        if self.download.as_deref() == Some("1") {
            "attachment"
        } else {
            "inline"
        }
    }
}

/// Response for delete operations
#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// File part of a multipart upload
struct UploadedFile {
    name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// List the caller's documents, newest first
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Document>>, ServiceError> {
    let documents = state.service.list_documents(&caller.user_id)?;
    Ok(Json(documents))
}

/// Upload a new document
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Document>), ServiceError> {
    let file = read_file_field(multipart?).await?;

    let document = state
        .service
        .upload_document(
            &caller.user_id,
            &file.name,
            file.content_type.as_deref(),
            &file.data,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(document)))
}

/// Upload a document and queue OCR for it in one call
pub async fn upload_with_ocr_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<LanguageParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<OcrAccepted>), ServiceError> {
    let file = read_file_field(multipart?).await?;

    let accepted = state
        .service
        .upload_document_with_ocr(
            &caller.user_id,
            &file.name,
            file.content_type.as_deref(),
            &file.data,
            params.lang.as_deref(),
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Get a single document
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    let document = state.service.get_document(&id, &caller.user_id)?;
    Ok(Json(document))
}

/// Stream the stored file of a document
pub async fn get_document_file_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Query(params): Query<FileParams>,
) -> Result<Response, ServiceError> {
    let opened = state.service.open_document_file(&id, &caller.user_id).await?;

    let disposition = format!(
        "{}; filename=\"{}\"",
        params.disposition(),
        opened.document.filename
    );

    Ok((
        [
            (header::CONTENT_TYPE, opened.document.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, opened.len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(opened.file)),
    )
        .into_response())
}

/// Replace the file of a document; its OCR text is dropped
pub async fn replace_document_file_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Document>, ServiceError> {
    let file = read_file_field(multipart?).await?;

    let document = state
        .service
        .replace_document_file(
            &id,
            &caller.user_id,
            &file.name,
            file.content_type.as_deref(),
            &file.data,
        )
        .await?;

    Ok(Json(document))
}

/// Delete a document together with its file, sessions and OCR state
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ServiceError> {
    state.service.delete_document(&id, &caller.user_id).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Document {} deleted", id),
    }))
}

/// Pull the `file` field out of a multipart body
async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, ServiceError> {
    let invalid = |e: axum::extract::multipart::MultipartError| ServiceError::InvalidRequest {
        message: e.body_text(),
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("document").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(invalid)?;

        return Ok(UploadedFile {
            name,
            content_type,
            data: data.to_vec(),
        });
    }

    Err(ServiceError::InvalidRequest {
        message: "No file provided".to_string(),
    })
}
