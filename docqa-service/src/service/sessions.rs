//! Question/answer sessions over a document's text.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::DocQaService;
use super::prompts::build_prompt_context;
use crate::db::LlmSession;
use crate::error::{ServiceError, ServiceResult};
use crate::generation::ChatMessage;

impl DocQaService {
    /// Open a session seeded with `seed_text` as its first question
    pub async fn create_session(
        &self,
        user_id: &str,
        document_id: &str,
        seed_text: &str,
        credential: &str,
    ) -> ServiceResult<LlmSession> {
        require_input(seed_text, credential)?;
        self.get_document(document_id, user_id)?;

        let answer = self
            .generation
            .generate(credential, vec![ChatMessage::user(seed_text)])
            .await
            .inspect_err(|e| warn!(doc_id = %document_id, error = %e, "Session seed generation failed"))?;

        let now = Utc::now();
        let session = LlmSession {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            questions: vec![seed_text.to_string()],
            answers: vec![answer],
            created_at: now,
            updated_at: now,
        };
        self.db.insert_session(&session)?;

        info!(doc_id = %document_id, session_id = %session.id, "LLM session created");
        Ok(session)
    }

    /// Ask one more question in an existing session.
    ///
    /// Calls on the same session are serialized; a failed generation leaves
    /// the session unchanged.
    pub async fn append_turn(
        &self,
        user_id: &str,
        document_id: &str,
        session_id: &str,
        question: &str,
        credential: &str,
    ) -> ServiceResult<LlmSession> {
        require_input(question, credential)?;

        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.append_turn_locked(user_id, document_id, session_id, question, credential)
                .await
        };

        drop(lock);
        self.session_locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    /// Most recent session of a document
    pub fn latest_session(&self, user_id: &str, document_id: &str) -> ServiceResult<LlmSession> {
        self.get_document(document_id, user_id)?;

        self.db
            .latest_session_for_document(document_id)?
            .filter(|session| session.user_id == user_id)
            .ok_or_else(|| ServiceError::SessionNotFound {
                session_id: format!("latest of document {document_id}"),
            })
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    async fn append_turn_locked(
        &self,
        user_id: &str,
        document_id: &str,
        session_id: &str,
        question: &str,
        credential: &str,
    ) -> ServiceResult<LlmSession> {
        self.get_document(document_id, user_id)?;

        let not_found = || ServiceError::SessionNotFound {
            session_id: session_id.to_string(),
        };

        let session = self
            .db
            .get_session(session_id)?
            .filter(|s| s.document_id == document_id && s.user_id == user_id)
            .ok_or_else(not_found)?;

        let generation = &self.config.generation;
        let messages = build_prompt_context(
            &generation.system_prompt,
            &session,
            generation.context_rounds,
            question,
        );
        debug!(
            session_id = %session_id,
            rounds = session.rounds(),
            messages = messages.len(),
            "Sending session context"
        );

        let answer = self
            .generation
            .generate(credential, messages)
            .await
            .inspect_err(|e| warn!(session_id = %session_id, error = %e, "Session turn generation failed"))?;

        if !self.db.append_turn(session_id, question, &answer)? {
            return Err(not_found());
        }

        info!(session_id = %session_id, rounds = session.rounds() + 1, "LLM session turn appended");

        self.db.get_session(session_id)?.ok_or_else(not_found)
    }
}

fn require_input(text: &str, credential: &str) -> ServiceResult<()> {
    if text.trim().is_empty() {
        return Err(ServiceError::InvalidRequest {
            message: "text is required".to_string(),
        });
    }
    if credential.trim().is_empty() {
        return Err(ServiceError::InvalidRequest {
            message: "generation credential is required".to_string(),
        });
    }
    Ok(())
}
