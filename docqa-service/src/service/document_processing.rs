//! Document lifecycle and background OCR jobs.
//!
//! - Upload and replacement of image files in the uploads directory
//! - OCR job start, supervision and status
//! - Cancellation and shutdown of running jobs
//! - CRUD operations and file streaming

mod cancellation;
mod crud;
mod processing;
mod upload;

pub(crate) use cancellation::OcrJobHandle;
pub use crud::DocumentFile;

use serde::Serialize;

use crate::progress::JobStatus;

/// Response to an accepted OCR start
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrAccepted {
    pub accepted: bool,
    pub document_id: String,
    pub status: JobStatus,
    pub status_endpoint: String,
}

impl OcrAccepted {
    pub(crate) fn queued(document_id: &str) -> Self {
        Self {
            accepted: true,
            document_id: document_id.to_string(),
            status: JobStatus::Queued,
            status_endpoint: format!("/documents/{document_id}/ocr/status"),
        }
    }
}
