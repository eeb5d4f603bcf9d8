//! Prompt context building for session rounds.

use crate::db::LlmSession;
use crate::generation::ChatMessage;

/// Build the messages for the next round of `session`.
///
/// The system instruction comes first, then at most `window` of the most
/// recent rounds in order, then `question`. A round with an empty answer
/// contributes only its question.
pub(crate) fn build_prompt_context(
    system_prompt: &str,
    session: &LlmSession,
    window: usize,
    question: &str,
) -> Vec<ChatMessage> {
    let rounds = session.rounds().min(session.answers.len());
    let start = rounds.saturating_sub(window);

    let mut messages = Vec::with_capacity(2 + 2 * (rounds - start));
    messages.push(ChatMessage::system(system_prompt));

    for (asked, answered) in session.questions[start..rounds]
        .iter()
        .zip(&session.answers[start..rounds])
    {
        messages.push(ChatMessage::user(asked));
        if !answered.is_empty() {
            messages.push(ChatMessage::assistant(answered));
        }
    }

    messages.push(ChatMessage::user(question));
    messages
}
