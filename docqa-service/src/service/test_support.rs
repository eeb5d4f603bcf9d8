//! Fake adapters and fixtures for service tests.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tempfile::TempDir;
use tokio::sync::{Notify, mpsc};

use super::DocQaService;
use crate::config::AppConfig;
use crate::db::{Database, Document};
use crate::error::{GenerationError, OcrError};
use crate::generation::{ChatMessage, GenerationClient};
use crate::ocr::{OcrEngine, OcrProgress};
use crate::progress::{Job, ProgressStore};

enum ScriptedOutcome {
    Text(String),
    Fail { status: i32, stderr: String },
    Hang,
}

/// OCR engine that replays a fixed script
pub(crate) struct ScriptedOcr {
    events: Vec<OcrProgress>,
    outcome: ScriptedOutcome,
    gate: Option<Arc<Notify>>,
    languages: Mutex<Vec<String>>,
}

impl ScriptedOcr {
    fn with_outcome(outcome: ScriptedOutcome) -> Self {
        Self {
            events: Vec::new(),
            outcome,
            gate: None,
            languages: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn text(text: &str) -> Self {
        Self::with_outcome(ScriptedOutcome::Text(text.to_string()))
    }

    pub(crate) fn failing(status: i32, stderr: &str) -> Self {
        Self::with_outcome(ScriptedOutcome::Fail {
            status,
            stderr: stderr.to_string(),
        })
    }

    /// Never finishes on its own
    pub(crate) fn hanging() -> Self {
        Self::with_outcome(ScriptedOutcome::Hang)
    }

    pub(crate) fn with_events(mut self, events: Vec<OcrProgress>) -> Self {
        self.events = events;
        self
    }

    /// Wait for a notification before producing the outcome
    pub(crate) fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Languages of every recognize call so far
    pub(crate) fn languages(&self) -> Vec<String> {
        self.languages.lock().unwrap().clone()
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize<'a>(
        &'a self,
        _image: &'a Path,
        language: &'a str,
        progress: mpsc::UnboundedSender<OcrProgress>,
    ) -> BoxFuture<'a, Result<String, OcrError>> {
        Box::pin(async move {
            self.languages.lock().unwrap().push(language.to_string());
            for event in &self.events {
                let _ = progress.send(event.clone());
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.outcome {
                ScriptedOutcome::Text(text) => Ok(text.clone()),
                ScriptedOutcome::Fail { status, stderr } => Err(OcrError::Engine {
                    status: *status,
                    stderr: stderr.clone(),
                }),
                ScriptedOutcome::Hang => futures::future::pending().await,
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum GenerationFailure {
    Unauthorized,
    RateLimited,
    Api,
}

/// Generation client that answers "answer to: <last message>" and records
/// every request
pub(crate) struct ScriptedGeneration {
    failure: Mutex<Option<GenerationFailure>>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedGeneration {
    pub(crate) fn echo() -> Self {
        Self {
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(failure: GenerationFailure) -> Self {
        let generation = Self::echo();
        generation.fail_with(failure);
        generation
    }

    pub(crate) fn fail_with(&self, failure: GenerationFailure) {
        *self.failure.lock().unwrap() = Some(failure);
    }

    /// Messages of every successful or failed call
    pub(crate) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, messages)| messages.clone())
            .collect()
    }

    pub(crate) fn credentials(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(credential, _)| credential.clone())
            .collect()
    }
}

impl GenerationClient for ScriptedGeneration {
    fn generate<'a>(
        &'a self,
        credential: &'a str,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        Box::pin(async move {
            let last = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push((credential.to_string(), messages));

            // Give concurrent callers a chance to interleave
            tokio::task::yield_now().await;

            let failure = *self.failure.lock().unwrap();
            match failure {
                None => Ok(format!("answer to: {last}")),
                Some(GenerationFailure::Unauthorized) => Err(GenerationError::Unauthorized {
                    message: "invalid api key".to_string(),
                }),
                Some(GenerationFailure::RateLimited) => Err(GenerationError::RateLimited {
                    message: "insufficient_quota".to_string(),
                    retry_after_secs: Some(30),
                }),
                Some(GenerationFailure::Api) => Err(GenerationError::Api {
                    status: 500,
                    message: "upstream exploded".to_string(),
                }),
            }
        })
    }
}

/// A service over a temporary data directory and an in-memory database
pub(crate) struct TestHarness {
    pub(crate) service: Arc<DocQaService>,
    pub(crate) ocr: Arc<ScriptedOcr>,
    pub(crate) generation: Arc<ScriptedGeneration>,
    pub(crate) dir: TempDir,
}

impl TestHarness {
    pub(crate) fn new(ocr: ScriptedOcr, generation: ScriptedGeneration) -> Self {
        Self::with_ocr_timeout(ocr, generation, 30)
    }

    pub(crate) fn with_ocr_timeout(
        ocr: ScriptedOcr,
        generation: ScriptedGeneration,
        timeout_secs: u64,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.ocr.timeout_secs = timeout_secs;

        let ocr = Arc::new(ocr);
        let generation = Arc::new(generation);
        let service = Arc::new(DocQaService::with_adapters(
            Arc::new(config),
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(ProgressStore::new()),
            ocr.clone(),
            generation.clone(),
        ));

        Self {
            service,
            ocr,
            generation,
            dir,
        }
    }

    /// Write `content` to a blob and insert a document pointing at it
    pub(crate) fn add_document(&self, id: &str, user_id: &str, content: &[u8]) -> Document {
        let uploads = self.dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let path = uploads.join(format!("{id}.png"));
        std::fs::write(&path, content).unwrap();

        let now = Utc::now();
        let document = Document {
            id: id.to_string(),
            user_id: user_id.to_string(),
            filename: format!("{id}.png"),
            original_name: format!("{id}.png"),
            path: path.to_string_lossy().to_string(),
            mime_type: "image/png".to_string(),
            size: content.len() as u64,
            extracted_text: None,
            created_at: now,
            updated_at: now,
        };
        self.service.db.insert_document(&document).unwrap();
        document
    }
}

/// Poll until the job for `document_id` is completed or failed
pub(crate) async fn wait_for_terminal(service: &DocQaService, document_id: &str) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = service.ocr_status(document_id);
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("OCR job did not finish in time")
}
