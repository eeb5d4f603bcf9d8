//! Document upload and file replacement.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::OcrAccepted;
use crate::db::Document;
use crate::error::{ServiceError, ServiceResult};
use crate::service::DocQaService;

impl DocQaService {
    /// Store an uploaded file and create its document record
    pub async fn upload_document(
        &self,
        user_id: &str,
        original_name: &str,
        mime_type: Option<&str>,
        content: &[u8],
    ) -> ServiceResult<Document> {
        self.check_upload_size(content)?;

        let doc_id = Uuid::new_v4().to_string();
        let blob = self.store_blob(original_name, content).await?;

        let now = Utc::now();
        let document = Document {
            id: doc_id.clone(),
            user_id: user_id.to_string(),
            filename: blob.filename,
            original_name: original_name.to_string(),
            path: blob.path,
            mime_type: mime_or_default(mime_type),
            size: content.len() as u64,
            extracted_text: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.db.insert_document(&document) {
            let _ = tokio::fs::remove_file(&document.path).await;
            return Err(e);
        }

        info!(
            doc_id = %doc_id,
            user_id = %user_id,
            size = document.size,
            "Document uploaded"
        );

        Ok(document)
    }

    /// Swap the file behind a document and drop its OCR text.
    ///
    /// Refused while an OCR job for the document is queued or running.
    pub async fn replace_document_file(
        &self,
        document_id: &str,
        user_id: &str,
        original_name: &str,
        mime_type: Option<&str>,
        content: &[u8],
    ) -> ServiceResult<Document> {
        let current = self.get_document(document_id, user_id)?;
        self.check_upload_size(content)?;

        if self.progress.get(document_id).status.is_active() {
            return Err(ServiceError::JobInProgress {
                document_id: document_id.to_string(),
            });
        }

        let blob = self.store_blob(original_name, content).await?;
        let replacement = Document {
            filename: blob.filename,
            original_name: original_name.to_string(),
            path: blob.path,
            mime_type: mime_or_default(mime_type),
            size: content.len() as u64,
            extracted_text: None,
            updated_at: Utc::now(),
            ..current.clone()
        };

        match self.db.replace_document_file(&replacement) {
            Ok(true) => {}
            Ok(false) => {
                let _ = tokio::fs::remove_file(&replacement.path).await;
                return Err(ServiceError::DocumentNotFound {
                    document_id: document_id.to_string(),
                });
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&replacement.path).await;
                return Err(e);
            }
        }

        // A job that slipped in after the check keeps its state; if it read
        // the old path its text is discarded on save.
        if let Err(job) = self.progress.reset_unless_active(document_id) {
            debug!(doc_id = %document_id, status = ?job.status, "OCR job started during file replacement");
        }

        if let Err(e) = tokio::fs::remove_file(&current.path).await {
            warn!(path = %current.path, error = %e, "Failed to delete replaced document file");
        }

        info!(
            doc_id = %document_id,
            size = replacement.size,
            "Document file replaced"
        );

        Ok(replacement)
    }

    /// Upload a document and immediately queue OCR for it
    pub async fn upload_document_with_ocr(
        &self,
        user_id: &str,
        original_name: &str,
        mime_type: Option<&str>,
        content: &[u8],
        language: Option<&str>,
    ) -> ServiceResult<OcrAccepted> {
        let document = self
            .upload_document(user_id, original_name, mime_type, content)
            .await?;
        self.start_ocr(&document.id, user_id, language).await
    }
}

/// A file written under the uploads directory
struct StoredBlob {
    filename: String,
    path: String,
}

impl DocQaService {
    fn check_upload_size(&self, content: &[u8]) -> ServiceResult<()> {
        if content.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Uploaded file is empty".to_string(),
            });
        }

        let max_size = self.config.limits.max_upload_bytes;
        if content.len() as u64 > max_size {
            return Err(ServiceError::InvalidRequest {
                message: format!(
                    "Uploaded file is {} bytes, the limit is {} bytes",
                    content.len(),
                    max_size
                ),
            });
        }

        Ok(())
    }

    /// Write `content` to a fresh `<uuid>.<ext>` file
    async fn store_blob(&self, original_name: &str, content: &[u8]) -> ServiceResult<StoredBlob> {
        let stem = Uuid::new_v4().to_string();
        let filename = match safe_extension(original_name) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        };

        let uploads_dir = self.config.storage.uploads_dir();
        tokio::fs::create_dir_all(&uploads_dir)
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to create uploads directory: {e}"),
            })?;

        let path = uploads_dir.join(&filename);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to store upload: {e}"),
            })?;

        Ok(StoredBlob {
            filename,
            path: path.to_string_lossy().to_string(),
        })
    }
}

fn mime_or_default(mime_type: Option<&str>) -> String {
    mime_type.unwrap_or("application/octet-stream").to_string()
}

/// Lowercased extension of a client file name, if it is plain alphanumeric
fn safe_extension(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{JobPatch, JobStatus};
    use crate::service::test_support::{
        ScriptedGeneration, ScriptedOcr, TestHarness, wait_for_terminal,
    };
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_upload_stores_blob_and_record() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());

        let document = harness
            .service
            .upload_document("alice", "Receipt.PNG", Some("image/png"), b"png bytes")
            .await
            .unwrap();

        assert_eq!(document.original_name, "Receipt.PNG");
        assert!(document.filename.ends_with(".png"));
        assert_eq!(document.size, 9);
        assert_eq!(std::fs::read(&document.path).unwrap(), b"png bytes");

        let stored = harness.service.db.get_document(&document.id).unwrap().unwrap();
        assert_eq!(stored, document);
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());

        let err = harness
            .service
            .upload_document("alice", "empty.png", None, b"")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
        assert!(harness.service.db.list_documents_for_user("alice").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_with_ocr_runs_job() {
        let harness = TestHarness::new(ScriptedOcr::text("Invoice total: $42"), ScriptedGeneration::echo());

        let accepted = harness
            .service
            .upload_document_with_ocr("alice", "scan.jpg", Some("image/jpeg"), b"jpeg", None)
            .await
            .unwrap();

        let job = wait_for_terminal(&harness.service, &accepted.document_id).await;
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_replace_swaps_blob_and_clears_text() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());
        let old = harness.add_document("d1", "alice", b"old bytes");
        harness.service.db.update_extracted_text("d1", Some("old text")).unwrap();
        harness.service.progress.begin("d1").unwrap();
        harness.service.progress.set("d1", JobPatch::completed("Done"));

        let document = harness
            .service
            .replace_document_file("d1", "alice", "page2.JPG", Some("image/jpeg"), b"new jpeg bytes")
            .await
            .unwrap();

        assert_eq!(document.id, "d1");
        assert_eq!(document.user_id, "alice");
        assert_eq!(document.original_name, "page2.JPG");
        assert_eq!(document.mime_type, "image/jpeg");
        assert_eq!(document.size, 14);
        assert!(document.filename.ends_with(".jpg"));
        assert_eq!(document.created_at, old.created_at);
        assert_eq!(std::fs::read(&document.path).unwrap(), b"new jpeg bytes");
        assert!(!Path::new(&old.path).exists());

        let stored = harness.service.db.get_document("d1").unwrap().unwrap();
        assert_eq!(stored.path, document.path);
        assert!(stored.extracted_text.is_none());
        assert_eq!(harness.service.ocr_status("d1").status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_replace_is_refused_while_ocr_runs() {
        let harness = TestHarness::new(ScriptedOcr::hanging(), ScriptedGeneration::echo());
        let old = harness.add_document("d1", "alice", b"old bytes");
        harness.service.start_ocr("d1", "alice", None).await.unwrap();

        let err = harness
            .service
            .replace_document_file("d1", "alice", "new.png", None, b"new bytes")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::JobInProgress { .. }));
        assert_eq!(std::fs::read(&old.path).unwrap(), b"old bytes");
        assert_eq!(
            harness.service.db.get_document("d1").unwrap().unwrap().path,
            old.path
        );

        harness.service.shutdown().await;
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_and_empty() {
        let harness = TestHarness::new(ScriptedOcr::text("x"), ScriptedGeneration::echo());
        let old = harness.add_document("d1", "alice", b"old bytes");

        let err = harness
            .service
            .replace_document_file("d1", "bob", "new.png", None, b"new bytes")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));

        let err = harness
            .service
            .replace_document_file("d1", "alice", "new.png", None, b"")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));

        assert_eq!(std::fs::read(&old.path).unwrap(), b"old bytes");
    }

    #[tokio::test]
    async fn test_text_of_replaced_file_is_discarded() {
        let gate = Arc::new(Notify::new());
        let harness = TestHarness::new(
            ScriptedOcr::text("text of the old page").gated(gate.clone()),
            ScriptedGeneration::echo(),
        );
        harness.add_document("d1", "alice", b"old bytes");
        harness.service.start_ocr("d1", "alice", None).await.unwrap();

        // Simulate a replacement that raced past the running-job check
        let mut replaced = harness.service.db.get_document("d1").unwrap().unwrap();
        replaced.path = harness.dir.path().join("uploads/other.png").to_string_lossy().to_string();
        harness.service.db.replace_document_file(&replaced).unwrap();

        gate.notify_one();
        let job = wait_for_terminal(&harness.service, "d1").await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(
            harness.service.db.get_document("d1").unwrap().unwrap().extracted_text.is_none()
        );
    }

    #[test]
    fn test_safe_extension() {
        assert_eq!(safe_extension("scan.PNG").as_deref(), Some("png"));
        assert_eq!(safe_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(safe_extension("noext"), None);
        assert_eq!(safe_extension("weird.p/g"), None);
        assert_eq!(safe_extension("evil.$(rm)"), None);
    }
}
