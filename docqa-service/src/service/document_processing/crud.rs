//! Document CRUD operations.

use std::io::ErrorKind;

use tokio::fs::File;
use tracing::{info, warn};

use crate::db::Document;
use crate::error::{ServiceError, ServiceResult};
use crate::service::DocQaService;

/// An opened document file and its size in bytes
pub struct DocumentFile {
    pub document: Document,
    pub file: File,
    pub len: u64,
}

impl DocQaService {
    /// List the caller's documents
    pub fn list_documents(&self, user_id: &str) -> ServiceResult<Vec<Document>> {
        self.db.list_documents_for_user(user_id)
    }

    /// Get a document owned by the caller
    pub fn get_document(&self, document_id: &str, user_id: &str) -> ServiceResult<Document> {
        self.db
            .get_document_for_user(document_id, user_id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    /// Delete a document, its blob, its sessions and any OCR state
    pub async fn delete_document(&self, document_id: &str, user_id: &str) -> ServiceResult<()> {
        let document = self.get_document(document_id, user_id)?;

        // Once the row is gone start_ocr reports DocumentNotFound, so no new
        // job can appear between stopping the old one and the reset.
        self.db.delete_document(document_id)?;

        if self.stop_ocr_job(document_id).await {
            info!(doc_id = %document_id, "Stopped in-progress OCR for deleted document");
        }
        self.progress.reset(document_id);

        if let Err(e) = tokio::fs::remove_file(&document.path).await {
            warn!(path = %document.path, error = %e, "Failed to delete document file");
        }

        info!(doc_id = %document_id, "Document deleted");
        Ok(())
    }

    /// Open the stored file of a document for streaming.
    ///
    /// A missing file is `FileNotFound`; an empty one is `FileUnavailable`.
    pub async fn open_document_file(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> ServiceResult<DocumentFile> {
        let document = self.get_document(document_id, user_id)?;

        let file = match File::open(&document.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(doc_id = %document_id, path = %document.path, "Document file not found");
                return Err(ServiceError::FileNotFound {
                    document_id: document_id.to_string(),
                });
            }
            Err(e) => {
                return Err(ServiceError::Internal {
                    message: format!("Failed to open document file: {e}"),
                });
            }
        };

        let len = file
            .metadata()
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to read document file metadata: {e}"),
            })?
            .len();
        if len == 0 {
            return Err(ServiceError::FileUnavailable {
                document_id: document_id.to_string(),
            });
        }

        Ok(DocumentFile {
            document,
            file,
            len,
        })
    }

    /// Drop the OCR text of a document
    pub fn clear_extracted_text(&self, document_id: &str, user_id: &str) -> ServiceResult<Document> {
        self.get_document(document_id, user_id)?;

        if !self.db.update_extracted_text(document_id, None)? {
            return Err(ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            });
        }

        self.get_document(document_id, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::JobStatus;
    use crate::service::test_support::{ScriptedGeneration, ScriptedOcr, TestHarness};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_get_is_owner_scoped() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());
        harness.add_document("d1", "alice", b"png bytes");

        assert_eq!(harness.service.get_document("d1", "alice").unwrap().id, "d1");
        assert!(matches!(
            harness.service.get_document("d1", "bob"),
            Err(ServiceError::DocumentNotFound { .. })
        ));
        assert_eq!(harness.service.list_documents("alice").unwrap().len(), 1);
        assert!(harness.service.list_documents("bob").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cancels_job_and_removes_everything() {
        let harness = TestHarness::new(ScriptedOcr::hanging(), ScriptedGeneration::echo());
        let document = harness.add_document("d1", "alice", b"png bytes");

        harness.service.start_ocr("d1", "alice", None).await.unwrap();
        harness.service.delete_document("d1", "alice").await.unwrap();

        assert_eq!(harness.service.ocr_status("d1").status, JobStatus::Idle);
        assert!(harness.service.db.get_document("d1").unwrap().is_none());
        assert!(!std::path::Path::new(&document.path).exists());
        assert!(!harness.service.cancel_ocr("d1"));
    }

    #[tokio::test]
    async fn test_start_after_delete_is_not_found() {
        let gate = Arc::new(Notify::new());
        let harness = TestHarness::new(
            ScriptedOcr::text("late text").gated(gate.clone()),
            ScriptedGeneration::echo(),
        );
        harness.add_document("d1", "alice", b"png bytes");

        harness.service.start_ocr("d1", "alice", None).await.unwrap();
        harness.service.delete_document("d1", "alice").await.unwrap();

        let err = harness.service.start_ocr("d1", "alice", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));
        assert_eq!(harness.service.ocr_status("d1").status, JobStatus::Idle);
        assert!(!harness.service.cancel_ocr("d1"));
    }

    #[tokio::test]
    async fn test_open_document_file() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());
        harness.add_document("d1", "alice", b"png bytes");

        let mut opened = harness.service.open_document_file("d1", "alice").await.unwrap();
        assert_eq!(opened.len, 9);
        assert_eq!(opened.document.mime_type, "image/png");

        let mut content = Vec::new();
        opened.file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"png bytes");

        assert!(matches!(
            harness.service.open_document_file("d1", "bob").await,
            Err(ServiceError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_missing_or_empty_file() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());
        let missing = harness.add_document("gone", "alice", b"png bytes");
        std::fs::remove_file(&missing.path).unwrap();
        harness.add_document("empty", "alice", b"");

        assert!(matches!(
            harness.service.open_document_file("gone", "alice").await,
            Err(ServiceError::FileNotFound { .. })
        ));
        assert!(matches!(
            harness.service.open_document_file("empty", "alice").await,
            Err(ServiceError::FileUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_of_foreign_document_is_not_found() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());
        harness.add_document("d1", "alice", b"png bytes");

        let err = harness.service.delete_document("d1", "bob").await.unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));
        assert!(harness.service.db.get_document("d1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_extracted_text() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());
        harness.add_document("d1", "alice", b"png bytes");
        harness.service.db.update_extracted_text("d1", Some("old text")).unwrap();

        let document = harness.service.clear_extracted_text("d1", "alice").unwrap();
        assert!(document.extracted_text.is_none());
    }
}
