//! Database module for SQLite operations.
//!
//! This module provides the `Database` struct and all database operations
//! organized into submodules by domain.

mod documents;
mod migrations;
pub mod models;
mod sessions;

pub use models::{Document, LlmSession};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{DatabaseError, ServiceError, ServiceResult};

/// Database manager for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> ServiceResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServiceError::Internal {
                message: format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ),
            })?;
        }

        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(DatabaseError::Query)?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> ServiceResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;

        // Run all migrations
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder leaves at most an uncommitted transaction, which
        // rusqlite rolls back on drop.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}


#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use super::Document;

    pub(crate) fn sample_document(id: &str, user_id: &str) -> Document {
        let now = Utc::now();
        Document {
            id: id.to_string(),
            user_id: user_id.to_string(),
            filename: format!("{id}.png"),
            original_name: "receipt.png".to_string(),
            path: format!("/tmp/uploads/{id}.png"),
            mime_type: "image/png".to_string(),
            size: 1024,
            extracted_text: None,
            created_at: now,
            updated_at: now,
        }
    }
}
