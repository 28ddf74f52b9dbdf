//! Per-turn state carried through the chat graph.

use ragchat_core::settings::ChatHistorySettings;
use ragchat_knowledge::{Document, DocumentFilters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Answered,
    Blocked,
    NoEvidence,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Answered => "answered",
            FinishReason::Blocked => "blocked",
            FinishReason::NoEvidence => "no_evidence",
            FinishReason::Error => "error",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One earlier question/answer pair of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub question: String,
    pub answer: String,
}

impl ChatExchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Keep only the newest `limit` exchanges.
pub fn truncate_history(history: &mut Vec<ChatExchange>, limit: usize) {
    let excess = history.len().saturating_sub(limit);
    history.drain(..excess);
}

/// State of one chat turn. Owned by a single graph run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurnState {
    pub session_id: String,
    question: String,
    /// Chronological, oldest first
    pub history: Vec<ChatExchange>,
    pub filters: DocumentFilters,
    pub detected_language: String,
    pub rephrased_question: String,
    pub harmful: bool,
    pub harmfulness_checked: bool,
    pub retrieved_documents: Vec<Document>,
    pub reranked_documents: Vec<Document>,
    pub answer: Option<String>,
    pub helpful: bool,
    pub citations: BTreeSet<String>,
    pub error_messages: Vec<String>,
    finish_reason: Option<FinishReason>,
    pub retry_count: u32,
}

impl ChatTurnState {
    pub fn new(
        session_id: impl Into<String>,
        question: impl Into<String>,
        history: Vec<ChatExchange>,
        filters: DocumentFilters,
    ) -> Self {
        let question = question.into();
        Self {
            session_id: session_id.into(),
            rephrased_question: question.clone(),
            question,
            history,
            filters,
            detected_language: "en".to_string(),
            harmful: false,
            harmfulness_checked: false,
            retrieved_documents: Vec::new(),
            reranked_documents: Vec::new(),
            answer: None,
            helpful: true,
            citations: BTreeSet::new(),
            error_messages: Vec::new(),
            finish_reason: None,
            retry_count: 0,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Enter the terminal state. Only the first call has an effect.
    pub fn finish(&mut self, reason: FinishReason, answer: impl Into<String>) {
        if let Some(existing) = self.finish_reason {
            tracing::warn!(%existing, requested = %reason, "Turn already finished");
            return;
        }
        self.finish_reason = Some(reason);
        self.answer = Some(answer.into());
        if reason != FinishReason::Answered {
            self.citations.clear();
        }
    }

    /// Record a recoverable failure of `node`.
    pub fn record_error(&mut self, node: &str, message: impl fmt::Display) {
        tracing::warn!(node, error = %message, "Recoverable error, using fallback");
        self.error_messages.push(format!("{}: {}", node, message));
    }

    /// The last `limit` exchanges as prompt text, newest first when `reverse`.
    pub fn render_history(&self, settings: &ChatHistorySettings) -> String {
        let start = self.history.len().saturating_sub(settings.limit);
        let window = &self.history[start..];
        let render = |exchange: &ChatExchange| {
            format!("user: {}\nassistant: {}", exchange.question, exchange.answer)
        };
        let rendered: Vec<String> = if settings.reverse {
            window.iter().rev().map(render).collect()
        } else {
            window.iter().map(render).collect()
        };
        rendered.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_history(n: usize) -> ChatTurnState {
        let history = (1..=n)
            .map(|i| ChatExchange::new(format!("q{}", i), format!("a{}", i)))
            .collect();
        ChatTurnState::new("s", "question", history, DocumentFilters::new())
    }

    #[test]
    fn test_defaults() {
        let state = ChatTurnState::new("s", "What is the capital of Germany?", vec![], DocumentFilters::new());
        assert_eq!(state.detected_language, "en");
        assert_eq!(state.rephrased_question, "What is the capital of Germany?");
        assert!(!state.harmful);
        assert!(state.helpful);
        assert!(state.answer.is_none());
        assert!(!state.is_finished());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = state_with_history(6).history;
        truncate_history(&mut history, 2);
        assert_eq!(
            history,
            vec![ChatExchange::new("q5", "a5"), ChatExchange::new("q6", "a6")]
        );

        let mut history = state_with_history(1).history;
        truncate_history(&mut history, 4);
        assert_eq!(history.len(), 1);
        truncate_history(&mut history, 0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_finish_is_set_once() {
        let mut state = state_with_history(0);
        state.citations.insert("doc".to_string());
        state.finish(FinishReason::Blocked, "refused");
        state.finish(FinishReason::Answered, "ignored");
        assert_eq!(state.finish_reason(), Some(FinishReason::Blocked));
        assert_eq!(state.answer.as_deref(), Some("refused"));
        assert!(state.citations.is_empty());
    }

    #[test]
    fn test_history_window_newest_first() {
        let state = state_with_history(6);
        let settings = ChatHistorySettings {
            limit: 2,
            reverse: true,
        };
        assert_eq!(
            state.render_history(&settings),
            "user: q6\nassistant: a6\nuser: q5\nassistant: a5"
        );

        let settings = ChatHistorySettings {
            limit: 2,
            reverse: false,
        };
        assert_eq!(
            state.render_history(&settings),
            "user: q5\nassistant: a5\nuser: q6\nassistant: a6"
        );
    }

    #[test]
    fn test_empty_history_renders_empty() {
        let state = state_with_history(0);
        assert_eq!(state.render_history(&ChatHistorySettings::default()), "");
    }

    #[test]
    fn test_finish_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FinishReason::NoEvidence).unwrap(),
            "\"no_evidence\""
        );
    }
}
