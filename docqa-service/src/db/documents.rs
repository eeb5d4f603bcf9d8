//! Document CRUD operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::Document;
use crate::error::{DatabaseError, ServiceResult};

const DOCUMENT_COLUMNS: &str = "id, user_id, filename, original_name, path, mime_type, size, \
                                extracted_text, created_at, updated_at";

impl Database {
    /// Insert a new document
    pub fn insert_document(&self, doc: &Document) -> ServiceResult<()> {
        let conn = self.conn();

        conn.execute(
            r#"
            INSERT INTO documents (id, user_id, filename, original_name, path, mime_type, size, extracted_text, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                doc.id,
                doc.user_id,
                doc.filename,
                doc.original_name,
                doc.path,
                doc.mime_type,
                doc.size as i64,
                doc.extracted_text,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a document by ID regardless of owner
    pub fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn();

        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Get a document by ID only if `user_id` owns it
    pub fn get_document_for_user(&self, id: &str, user_id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn();

        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1 AND user_id = ?2"),
            params![id, user_id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// List a user's documents, newest first
    pub fn list_documents_for_user(&self, user_id: &str) -> ServiceResult<Vec<Document>> {
        let conn = self.conn();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![user_id], Document::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Replace (or clear, with `None`) the OCR text of a document.
    ///
    /// Returns `false` if the document no longer exists.
    pub fn update_extracted_text(&self, id: &str, text: Option<&str>) -> ServiceResult<bool> {
        let conn = self.conn();

        let rows = conn
            .execute(
                "UPDATE documents SET extracted_text = ?1, updated_at = ?2 WHERE id = ?3",
                params![text, Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Save OCR text produced from the blob at `path`.
    ///
    /// Returns `false` if the document is gone or now points at another file.
    pub fn store_ocr_text(&self, id: &str, path: &str, text: &str) -> ServiceResult<bool> {
        let conn = self.conn();

        let rows = conn
            .execute(
                "UPDATE documents SET extracted_text = ?1, updated_at = ?2 WHERE id = ?3 AND path = ?4",
                params![text, Utc::now().to_rfc3339(), id, path],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Point a document at a new blob and drop its OCR text.
    ///
    /// Only the file columns of `doc` are written. Returns `false` if the
    /// document no longer exists.
    pub fn replace_document_file(&self, doc: &Document) -> ServiceResult<bool> {
        let conn = self.conn();

        let rows = conn
            .execute(
                r#"
                UPDATE documents
                SET filename = ?1, original_name = ?2, path = ?3, mime_type = ?4, size = ?5,
                    extracted_text = NULL, updated_at = ?6
                WHERE id = ?7
                "#,
                params![
                    doc.filename,
                    doc.original_name,
                    doc.path,
                    doc.mime_type,
                    doc.size as i64,
                    doc.updated_at.to_rfc3339(),
                    doc.id,
                ],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Delete a document; its sessions go with it
    pub fn delete_document(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn();

        let rows = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }
}
