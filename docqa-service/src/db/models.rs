//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Uploaded document record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub user_id: String,
    /// Name of the stored blob inside the uploads directory
    pub filename: String,
    /// Name the file had on the client
    pub original_name: String,
    pub path: String,
    pub mime_type: String,
    pub size: u64,
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let size: i64 = row.get(6)?;
        let created_at_str: String = row.get(8)?;
        let updated_at_str: String = row.get(9)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            filename: row.get(2)?,
            original_name: row.get(3)?,
            path: row.get(4)?,
            mime_type: row.get(5)?,
            size: size.max(0) as u64,
            extracted_text: row.get(7)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

/// Question/answer session attached to a document
///
/// `questions[i]` and `answers[i]` form round `i`; both sequences always have
/// the same length and only ever grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSession {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Time of the latest round
    pub updated_at: DateTime<Utc>,
}

impl LlmSession {
    /// Number of completed rounds
    pub fn rounds(&self) -> usize {
        self.questions.len()
    }
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
