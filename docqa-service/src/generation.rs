use futures::future::BoxFuture;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{GenerationError, ServiceResult};

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Text-generation backend
pub trait GenerationClient: Send + Sync {
    /// Produce the next assistant message for `messages`, authenticating with
    /// the caller-supplied `credential`.
    fn generate<'a>(
        &'a self,
        credential: &'a str,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'a, Result<String, GenerationError>>;
}

/// Client for OpenAI-compatible chat completion APIs
pub struct OpenAiClient {
    client: Client,
    config: GenerationConfig,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: GenerationConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Connection {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self { client, config })
    }

    async fn chat(&self, credential: &str, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
        };

        debug!(model = %self.config.model, messages = request.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let message = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, retry_after_secs, message));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse { source: e })?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

impl GenerationClient for OpenAiClient {
    fn generate<'a>(
        &'a self,
        credential: &'a str,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        Box::pin(self.chat(credential, messages))
    }
}

/// Map a non-success HTTP status from the generation API to an error kind
pub(crate) fn classify_failure(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    message: String,
) -> GenerationError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GenerationError::Unauthorized { message }
        }
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited {
            message,
            retry_after_secs,
        },
        _ if message.contains("insufficient_quota") => GenerationError::RateLimited {
            message,
            retry_after_secs,
        },
        _ => GenerationError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

// Internal API types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
