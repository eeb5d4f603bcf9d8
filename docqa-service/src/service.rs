//! Service coordinator.
//!
//! `DocQaService` owns the adapters, the progress table and the background
//! OCR jobs. HTTP handlers only ever talk to this type.

mod document_processing;
mod prompts;
mod sessions;
#[cfg(test)]
pub(crate) mod test_support;

pub use document_processing::{DocumentFile, OcrAccepted};

use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::ServiceResult;
use crate::generation::{GenerationClient, OpenAiClient};
use crate::ocr::{OcrEngine, TesseractEngine};
use crate::progress::ProgressStore;

use document_processing::OcrJobHandle;

/// Main service coordinator
pub struct DocQaService {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub progress: Arc<ProgressStore>,
    ocr: Arc<dyn OcrEngine>,
    generation: Arc<dyn GenerationClient>,
    /// Running OCR tasks, keyed by document id
    ocr_jobs: Arc<DashMap<String, OcrJobHandle>>,
    /// Per-session update locks, keyed by session id
    session_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Parent of every job token
    shutdown: CancellationToken,
}

impl DocQaService {
    /// Create a service backed by the tesseract CLI and an OpenAI-compatible API
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>) -> ServiceResult<Self> {
        info!("Initializing document Q/A service");

        let ocr = Arc::new(TesseractEngine::new(&config.ocr));
        info!(command = %config.ocr.command, "OCR engine configured");

        let generation = Arc::new(OpenAiClient::new(config.generation.clone())?);
        info!(
            url = %config.generation.base_url,
            model = %config.generation.model,
            "Generation client configured"
        );

        Ok(Self::with_adapters(
            config,
            db,
            Arc::new(ProgressStore::new()),
            ocr,
            generation,
        ))
    }

    /// Create a service with explicit adapters and progress table
    pub fn with_adapters(
        config: Arc<AppConfig>,
        db: Arc<Database>,
        progress: Arc<ProgressStore>,
        ocr: Arc<dyn OcrEngine>,
        generation: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            config,
            db,
            progress,
            ocr,
            generation,
            ocr_jobs: Arc::new(DashMap::new()),
            session_locks: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::JobStatus;
    use crate::service::test_support::{ScriptedGeneration, ScriptedOcr};

    #[tokio::test]
    async fn test_injected_progress_table_is_shared() {
        let progress = Arc::new(ProgressStore::new());
        progress.begin("d1").unwrap();

        let service = DocQaService::with_adapters(
            Arc::new(AppConfig::default()),
            Arc::new(Database::open_in_memory().unwrap()),
            progress.clone(),
            Arc::new(ScriptedOcr::text("x")),
            Arc::new(ScriptedGeneration::echo()),
        );

        assert!(Arc::ptr_eq(&service.progress, &progress));
        assert_eq!(service.ocr_status("d1").status, JobStatus::Queued);

        progress.reset("d1");
        assert_eq!(service.ocr_status("d1").status, JobStatus::Idle);
    }
}
