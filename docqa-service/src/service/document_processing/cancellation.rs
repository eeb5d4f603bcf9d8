//! Handle and cancellation token management for OCR jobs.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::service::DocQaService;

/// A running OCR task
pub(crate) struct OcrJobHandle {
    /// Distinguishes this run from later runs on the same document
    pub(crate) job_id: Uuid,
    pub(crate) token: CancellationToken,
    pub(crate) handle: JoinHandle<()>,
}

impl DocQaService {
    /// Token for a new job; cancelled with the service as well.
    pub(crate) fn new_job_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Track the handle of a freshly spawned job.
    pub(crate) fn register_ocr_job(&self, document_id: &str, job: OcrJobHandle) {
        // A finished predecessor may still be in the map; its task only
        // removes entries carrying its own job id.
        self.ocr_jobs.insert(document_id.to_string(), job);
    }

    /// Fire the cancellation token of the running job for a document.
    ///
    /// Returns `false` when no job is running.
    pub fn cancel_ocr(&self, document_id: &str) -> bool {
        match self.ocr_jobs.get(document_id) {
            Some(job) if !job.handle.is_finished() => {
                job.token.cancel();
                info!(doc_id = %document_id, job_id = %job.job_id, "OCR cancellation triggered");
                true
            }
            _ => false,
        }
    }

    /// Cancel the job for a document and wait for its task to exit.
    pub(crate) async fn stop_ocr_job(&self, document_id: &str) -> bool {
        let Some((_, job)) = self.ocr_jobs.remove(document_id) else {
            return false;
        };

        job.token.cancel();
        if let Err(e) = job.handle.await {
            warn!(doc_id = %document_id, error = %e, "OCR task ended abnormally");
        }
        true
    }

    /// Cancel every running job and join their tasks.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let document_ids: Vec<String> = self.ocr_jobs.iter().map(|e| e.key().clone()).collect();
        if !document_ids.is_empty() {
            info!(jobs = document_ids.len(), "Waiting for OCR jobs to stop");
        }

        for document_id in document_ids {
            self.stop_ocr_job(&document_id).await;
        }
    }
}
