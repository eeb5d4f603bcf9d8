//! Database schema migrations.
//!
//! This module contains all database migrations and schema setup.

use rusqlite::{Connection, params};

use crate::error::{DatabaseError, ServiceResult};

/// Run all database migrations.
///
/// This function is called during database initialization to ensure
/// the schema is up to date.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    // Initial schema setup
    conn.execute_batch(
        r#"
        -- Documents table
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            original_name TEXT NOT NULL,
            path TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            extracted_text TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id, created_at);

        -- LLM sessions, one row per session
        CREATE TABLE IF NOT EXISTS llm_sessions (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_llm_sessions_document ON llm_sessions(document_id, created_at);

        -- Question/answer rounds, ordered by turn_index within a session
        CREATE TABLE IF NOT EXISTS llm_turns (
            session_id TEXT NOT NULL,
            turn_index INTEGER NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (session_id, turn_index),
            FOREIGN KEY (session_id) REFERENCES llm_sessions(id) ON DELETE CASCADE
        );
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    run_session_arrays_migration(conn)?;

    Ok(())
}

/// Migration: move JSON `questions`/`answers` array columns into `llm_turns`
///
/// Older databases kept each session's rounds as two JSON arrays on the
/// session row. Rounds are copied pairwise (a missing answer becomes an empty
/// string, a surplus answer is dropped) and the array columns are removed.
fn run_session_arrays_migration(conn: &Connection) -> ServiceResult<()> {
    let has_questions_column: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('llm_sessions') WHERE name='questions'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .unwrap_or(0)
        > 0;

    if !has_questions_column {
        return Ok(());
    }

    let migration_err = |e: rusqlite::Error| DatabaseError::Migration {
        message: format!("Failed to migrate session arrays: {}", e),
    };

    conn.execute_batch("BEGIN IMMEDIATE;").map_err(migration_err)?;

    let result = (|| -> Result<usize, rusqlite::Error> {
        let mut stmt = conn.prepare("SELECT id, questions, answers, created_at FROM llm_sessions")?;
        let rows: Vec<(String, Option<String>, Option<String>, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        let mut migrated = 0;
        for (session_id, questions, answers, created_at) in rows {
            let questions = parse_string_array(questions.as_deref());
            let answers = parse_string_array(answers.as_deref());

            for (index, question) in questions.iter().enumerate() {
                let answer = answers.get(index).map(String::as_str).unwrap_or("");
                conn.execute(
                    "INSERT OR IGNORE INTO llm_turns (session_id, turn_index, question, answer, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![session_id, index as i64, question, answer, created_at],
                )?;
            }
            migrated += 1;
        }

        conn.execute_batch(
            r#"
            ALTER TABLE llm_sessions DROP COLUMN questions;
            ALTER TABLE llm_sessions DROP COLUMN answers;
            "#,
        )?;

        Ok(migrated)
    })();

    match result {
        Ok(migrated) => {
            conn.execute_batch("COMMIT;").map_err(migration_err)?;
            tracing::info!(sessions = migrated, "Migrated session arrays into llm_turns");
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(migration_err(e).into())
        }
    }
}

/// Lenient read of a legacy JSON array column; anything that is not an array
/// of strings yields no rounds.
fn parse_string_array(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<serde_json::Value>>(s).ok())
        .map(|values| {
            values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
