//! Service configuration.
//!
//! Server binding and storage live in [`static_config`]; the OCR, generation
//! and limits sections are defined here. Everything is loaded once at startup
//! by [`loader::load_config`].

pub mod loader;
mod static_config;

use serde::Deserialize;
use std::time::Duration;

pub use static_config::{ServerConfig, StorageConfig};
use static_config::{default_server, default_storage};

/// Full application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            ocr: OcrConfig::default(),
            generation: GenerationConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// OCR engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Executable invoked for recognition (tesseract-compatible CLI)
    #[serde(default = "default_ocr_command")]
    pub command: String,

    /// Language passed to the engine when the request does not name one
    #[serde(default = "default_ocr_language")]
    pub default_language: String,

    /// Upper bound for a single OCR job in seconds
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,

    /// Typical recognition time in seconds, used to estimate progress
    #[serde(default = "default_ocr_expected_secs")]
    pub expected_secs: u64,

    /// Interval between estimated progress reports in milliseconds
    #[serde(default = "default_ocr_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn expected(&self) -> Duration {
        Duration::from_secs(self.expected_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            default_language: default_ocr_language(),
            timeout_secs: default_ocr_timeout_secs(),
            expected_secs: default_ocr_expected_secs(),
            progress_interval_ms: default_ocr_progress_interval_ms(),
        }
    }
}

/// Text-generation service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible API (without the `/chat/completions` suffix)
    #[serde(default = "default_generation_url")]
    pub base_url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of prior question/answer rounds sent with each follow-up question
    #[serde(default = "default_context_rounds")]
    pub context_rounds: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_url(),
            model: default_generation_model(),
            request_timeout_secs: default_request_timeout_secs(),
            context_rounds: default_context_rounds(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

// ==================== Default Value Functions ====================

fn default_ocr_command() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    600
}

fn default_ocr_expected_secs() -> u64 {
    30
}

fn default_ocr_progress_interval_ms() -> u64 {
    500
}

fn default_generation_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_generation_model() -> String {
    "gpt-4".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_context_rounds() -> usize {
    5
}

fn default_system_prompt() -> String {
    "You are a helpful assistant answering questions about a scanned document. \
     The first user message contains the text extracted from the document."
        .to_string()
}

fn default_max_upload_bytes() -> u64 {
    20 * 1024 * 1024
}
