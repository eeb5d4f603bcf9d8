//! LLM session endpoints.
//!
//! Missing documents and sessions are reported as bad requests here, since
//! the identifiers come from the request itself. Bodies that are absent or
//! not valid JSON are bad requests as well.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::LlmSession;
use crate::error::ServiceError;

use super::AppState;
use super::caller::{Caller, GenerationCredential};

/// Body of the initialize and answer endpoints
#[derive(Debug, Default, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: Option<String>,
}

impl TextRequest {
    fn require_text(self) -> Result<String, ServiceError> {
        self.text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidRequest {
                message: "text is required".to_string(),
            })
    }
}

/// Session wrapper returned by every session endpoint
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub llm_session: LlmSession,
}

/// Start a session seeded with the given text
pub async fn initialize_session_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    credential: GenerationCredential,
    Path(id): Path<String>,
    body: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let Json(body) = body?;
    let text = body.require_text()?;
    let credential = credential.require()?;

    let session = state
        .service
        .create_session(&caller.user_id, &id, &text, &credential)
        .await
        .map_err(ServiceError::not_found_as_bad_request)?;

    Ok(Json(SessionResponse { llm_session: session }))
}

/// Ask a follow-up question in a session
pub async fn append_turn_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    credential: GenerationCredential,
    Path((id, session_id)): Path<(String, String)>,
    body: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let Json(body) = body?;
    let text = body.require_text()?;
    let credential = credential.require()?;

    let session = state
        .service
        .append_turn(&caller.user_id, &id, &session_id, &text, &credential)
        .await
        .map_err(ServiceError::not_found_as_bad_request)?;

    Ok(Json(SessionResponse { llm_session: session }))
}

/// Most recent session of a document
pub async fn latest_session_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let session = state.service.latest_session(&caller.user_id, &id)?;
    Ok(Json(SessionResponse { llm_session: session }))
}
