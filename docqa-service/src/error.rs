use axum::{
    Json,
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("LLM session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Document file is missing or empty: {document_id}")]
    FileUnavailable { document_id: String },

    #[error("Document file not found on server: {document_id}")]
    FileNotFound { document_id: String },

    #[error("OCR job already in progress for document {document_id}")]
    JobInProgress { document_id: String },

    #[error("Missing caller identity")]
    Unauthenticated,

    #[error("OCR failed")]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// OCR engine errors
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to launch OCR engine `{command}`")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR engine exited with status {status}: {stderr}")]
    Engine { status: i32, stderr: String },

    #[error("OCR engine produced invalid UTF-8 output")]
    InvalidOutput(#[source] std::string::FromUtf8Error),

    #[error("OCR timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("OCR cancelled")]
    Cancelled,
}

/// Text-generation client errors
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation service rejected the credential")]
    Unauthorized { message: String },

    #[error("Generation service quota exceeded or rate limited")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Connection failed to generation service at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Generation failed (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from generation service")]
    InvalidResponse {
        #[source]
        source: reqwest::Error,
    },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ServiceError {
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. }
            | ServiceError::SessionNotFound { .. }
            | ServiceError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::JobInProgress { .. } => StatusCode::CONFLICT,
            ServiceError::Unauthenticated
            | ServiceError::Generation(GenerationError::Unauthorized { .. }) => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::Generation(GenerationError::RateLimited { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ServiceError::Generation(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::SessionNotFound { .. } => "session_not_found",
            ServiceError::FileUnavailable { .. } => "file_unavailable",
            ServiceError::FileNotFound { .. } => "file_not_found",
            ServiceError::JobInProgress { .. } => "job_in_progress",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::Ocr(_) => "ocr_error",
            ServiceError::Generation(GenerationError::Unauthorized { .. }) => {
                "generation_unauthorized"
            }
            ServiceError::Generation(GenerationError::RateLimited { .. }) => {
                "generation_throttled"
            }
            ServiceError::Generation(_) => "generation_error",
            ServiceError::Database(_) => "database_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ServiceError::Generation(GenerationError::RateLimited {
                retry_after_secs, ..
            }) => *retry_after_secs,
            _ => None,
        }
    }

    /// Re-tag lookups that failed on the conversation endpoints as bad requests.
    ///
    /// The LLM routes report a missing document or session as 400 rather than 404.
    pub fn not_found_as_bad_request(self) -> Self {
        match self {
            ServiceError::DocumentNotFound { .. } | ServiceError::SessionNotFound { .. } => {
                ServiceError::InvalidRequest {
                    message: self.to_string(),
                }
            }
            other => other,
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::InvalidRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartRejection> for ServiceError {
    fn from(rejection: MultipartRejection) -> Self {
        ServiceError::InvalidRequest {
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %format_error_chain_ref(&self), "Request failed");
        }

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
            retry_after_secs: self.retry_after_secs(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and its `source()` chain as a single line.
pub fn format_error_chain_ref(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServiceError::DocumentNotFound {
                document_id: "1".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::FileUnavailable {
                document_id: "1".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::FileNotFound {
                document_id: "1".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Generation(GenerationError::Unauthorized {
                message: "bad key".into()
            })
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Generation(GenerationError::RateLimited {
                message: "quota".into(),
                retry_after_secs: Some(20),
            })
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServiceError::Generation(GenerationError::Api {
                status: 500,
                message: "boom".into()
            })
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_not_found_as_bad_request() {
        let err = ServiceError::SessionNotFound {
            session_id: "s1".into(),
        }
        .not_found_as_bad_request();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = ServiceError::Generation(GenerationError::Unauthorized {
            message: String::new(),
        })
        .not_found_as_bad_request();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_format_error_chain() {
        let err = ServiceError::Ocr(OcrError::Launch {
            command: "tesseract".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
        assert_eq!(
            format_error_chain_ref(&err),
            "OCR failed: Failed to launch OCR engine `tesseract`: no such file"
        );
    }
}
