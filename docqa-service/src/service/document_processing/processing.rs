//! OCR job start and the background runner.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::OcrAccepted;
use super::cancellation::OcrJobHandle;
use crate::db::{Database, Document};
use crate::error::{OcrError, ServiceError, ServiceResult, format_error_chain_ref};
use crate::ocr::OcrEngine;
use crate::progress::{Job, JobPatch, ProgressStore};
use crate::service::DocQaService;

/// Everything a runner task needs, detached from the service borrow
struct OcrJobContext {
    db: Arc<Database>,
    progress: Arc<ProgressStore>,
    ocr: Arc<dyn OcrEngine>,
    jobs: Arc<DashMap<String, OcrJobHandle>>,
    timeout: Duration,
}

impl DocQaService {
    /// Start OCR for a document owned by `user_id`.
    ///
    /// Returns as soon as the job is queued; progress is observed through
    /// [`DocQaService::ocr_status`].
    pub async fn start_ocr(
        &self,
        document_id: &str,
        user_id: &str,
        language: Option<&str>,
    ) -> ServiceResult<OcrAccepted> {
        let document = self
            .db
            .get_document_for_user(document_id, user_id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })?;

        let language = resolve_language(language, &self.config.ocr.default_language)?;

        // Checked before any progress state exists for the document
        let usable = tokio::fs::metadata(&document.path)
            .await
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);
        if !usable {
            warn!(doc_id = %document_id, path = %document.path, "Document file is missing or empty");
            return Err(ServiceError::FileUnavailable {
                document_id: document_id.to_string(),
            });
        }

        if let Err(current) = self.progress.begin(document_id) {
            debug!(doc_id = %document_id, status = ?current.status, "OCR start rejected, job in flight");
            return Err(ServiceError::JobInProgress {
                document_id: document_id.to_string(),
            });
        }

        self.spawn_ocr_job(document, language);

        Ok(OcrAccepted::queued(document_id))
    }

    /// Current job snapshot for a document; never fails.
    pub fn ocr_status(&self, document_id: &str) -> Job {
        self.progress.get(document_id)
    }

    fn spawn_ocr_job(&self, document: Document, language: String) {
        let document_id = document.id.clone();
        let job_id = Uuid::new_v4();
        let token = self.new_job_token();

        let ctx = OcrJobContext {
            db: self.db.clone(),
            progress: self.progress.clone(),
            ocr: self.ocr.clone(),
            jobs: self.ocr_jobs.clone(),
            timeout: self.config.ocr.timeout(),
        };

        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            // The handle must be in the map before the task can remove it
            let _ = registered_rx.await;
            run_ocr_job(ctx, document, language, job_id, task_token).await;
        });

        self.register_ocr_job(
            &document_id,
            OcrJobHandle {
                job_id,
                token,
                handle,
            },
        );
        let _ = registered_tx.send(());

        info!(doc_id = %document_id, job_id = %job_id, "OCR job queued");
    }
}

/// Pick the engine language, rejecting anything that is not a plain
/// language list such as `eng` or `eng+deu`.
fn resolve_language(requested: Option<&str>, default: &str) -> ServiceResult<String> {
    let language = requested
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(default);

    let valid = language
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+');
    if !valid {
        return Err(ServiceError::InvalidRequest {
            message: format!("Unsupported OCR language: {language}"),
        });
    }

    Ok(language.to_string())
}

async fn run_ocr_job(
    ctx: OcrJobContext,
    document: Document,
    language: String,
    job_id: Uuid,
    token: CancellationToken,
) {
    let doc_id = document.id.as_str();
    info!(doc_id = %doc_id, language = %language, "OCR job started");

    ctx.progress.set(doc_id, JobPatch::running(1, "Starting OCR"));

    let outcome = recognize_with_progress(&ctx, &document, &language, &token).await;

    let patch = match outcome {
        Ok(text) => match ctx.db.store_ocr_text(doc_id, &document.path, &text) {
            Ok(true) => {
                info!(doc_id = %doc_id, chars = text.len(), "OCR job completed");
                JobPatch::completed("Done")
            }
            Ok(false) => {
                warn!(doc_id = %doc_id, "Document deleted or replaced before OCR text was saved");
                JobPatch::failed("Document was deleted or replaced during OCR")
            }
            Err(e) => {
                let message = format_error_chain_ref(&e);
                error!(doc_id = %doc_id, error = %message, "Failed to save OCR text");
                JobPatch::failed(message)
            }
        },
        Err(e) => {
            let message = format_error_chain_ref(&e);
            match e {
                OcrError::Cancelled => info!(doc_id = %doc_id, "OCR job cancelled"),
                _ => error!(doc_id = %doc_id, error = %message, "OCR job failed"),
            }
            JobPatch::failed(message)
        }
    };

    ctx.progress.set(doc_id, patch);
    ctx.jobs.remove_if(doc_id, |_, job| job.job_id == job_id);
}

/// Drive the engine while mirroring its events into the progress table.
async fn recognize_with_progress(
    ctx: &OcrJobContext,
    document: &Document,
    language: &str,
    token: &CancellationToken,
) -> Result<String, OcrError> {
    let doc_id = document.id.as_str();
    let image = PathBuf::from(&document.path);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut recognition = ctx.ocr.recognize(&image, language, tx);
    let deadline = tokio::time::sleep(ctx.timeout);
    tokio::pin!(deadline);

    let mut last_percent = 1u8;
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => return Err(OcrError::Cancelled),
            _ = &mut deadline => {
                return Err(OcrError::Timeout {
                    secs: ctx.timeout.as_secs(),
                });
            }
            Some(event) = rx.recv() => {
                last_percent = last_percent.max(event.percent());
                debug!(doc_id = %doc_id, progress = last_percent, status = %event.status, "OCR progress");
                ctx.progress.set(doc_id, JobPatch::running(last_percent, event.status));
            }
            result = &mut recognition => return result,
        }
    }
}
