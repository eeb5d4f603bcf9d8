//! LLM session storage.
//!
//! A session row carries ownership; its rounds live in `llm_turns` so that
//! appending a round is a single insert instead of rewriting two arrays.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{LlmSession, parse_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Insert a session together with any rounds it already has
    pub fn insert_session(&self, session: &LlmSession) -> ServiceResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        tx.execute(
            "INSERT INTO llm_sessions (id, document_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id,
                session.document_id,
                session.user_id,
                session.created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        let updated_at = session.updated_at.to_rfc3339();
        for (index, question) in session.questions.iter().enumerate() {
            let answer = session.answers.get(index).map(String::as_str).unwrap_or("");
            tx.execute(
                "INSERT INTO llm_turns (session_id, turn_index, question, answer, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session.id, index as i64, question, answer, updated_at],
            )
            .map_err(DatabaseError::Query)?;
        }

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Load a session and its rounds in order
    pub fn get_session(&self, id: &str) -> ServiceResult<Option<LlmSession>> {
        let conn = self.conn();

        let header = conn
            .query_row(
                "SELECT id, document_id, user_id, created_at FROM llm_sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(DatabaseError::Query)?;

        let Some((id, document_id, user_id, created_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT question, answer, created_at FROM llm_turns \
                 WHERE session_id = ?1 ORDER BY turn_index",
            )
            .map_err(DatabaseError::Query)?;
        let turns = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        let created_at = parse_timestamp(&created_at);
        let updated_at = turns
            .last()
            .map(|(_, _, at)| parse_timestamp(at))
            .unwrap_or(created_at);

        let mut questions = Vec::with_capacity(turns.len());
        let mut answers = Vec::with_capacity(turns.len());
        for (question, answer, _) in turns {
            questions.push(question);
            answers.push(answer);
        }

        Ok(Some(LlmSession {
            id,
            document_id,
            user_id,
            questions,
            answers,
            created_at,
            updated_at,
        }))
    }

    /// Most recently created session for a document, if any
    pub fn latest_session_for_document(&self, document_id: &str) -> ServiceResult<Option<LlmSession>> {
        let session_id: Option<String> = {
            let conn = self.conn();
            conn.query_row(
                "SELECT id FROM llm_sessions WHERE document_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Query)?
        };

        match session_id {
            Some(id) => self.get_session(&id),
            None => Ok(None),
        }
    }

    /// Append one round to a session.
    ///
    /// Returns `false` if the session no longer exists.
    pub fn append_turn(&self, session_id: &str, question: &str, answer: &str) -> ServiceResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM llm_sessions WHERE id = ?1",
                params![session_id],
                |_| Ok(()),
            )
            .optional()
            .map_err(DatabaseError::Query)?
            .is_some();

        if !exists {
            return Ok(false);
        }

        let next_index: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(turn_index) + 1, 0) FROM llm_turns WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        tx.execute(
            "INSERT INTO llm_turns (session_id, turn_index, question, answer, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, next_index, question, answer, Utc::now().to_rfc3339()],
        )
        .map_err(DatabaseError::Query)?;

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(true)
    }
}
