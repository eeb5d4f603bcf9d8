//! Request extractors for caller identity and the generation credential.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use crate::error::ServiceError;

/// Header carrying the authenticated user id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|user_id| Caller {
                user_id: user_id.to_string(),
            })
            .ok_or(ServiceError::Unauthenticated)
    }
}

/// Bearer token forwarded to the generation service, if the request has one
#[derive(Debug, Clone)]
pub struct GenerationCredential(pub Option<String>);

impl GenerationCredential {
    /// The token, or an invalid-request error when absent
    pub fn require(self) -> Result<String, ServiceError> {
        self.0.ok_or_else(|| ServiceError::InvalidRequest {
            message: "A bearer credential for the generation service is required".to_string(),
        })
    }
}

impl<S> FromRequestParts<S> for GenerationCredential
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // A missing or malformed header both count as no credential
        let token = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());

        Ok(GenerationCredential(token.filter(|t| !t.is_empty())))
    }
}
