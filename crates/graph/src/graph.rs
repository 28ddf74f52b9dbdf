//! The chat graph orchestrator.
//!
//! ```text
//! language_detect → rephrase → harmfulness_check ─┬─ harmful ──────────────→ blocked
//!                      ↑                           └→ retrieve → rerank ─┬─ none ─→ no_evidence
//!                      │                                                 └→ generate_answer
//!                      └──── not helpful, retries left ── helpfulness_check ←┘
//!                                                          └ otherwise ──→ answered
//! ```
//!
//! Each node computes a new state from the current one; the graph commits it
//! only once the node has finished, so a cancelled turn keeps the last
//! committed state.

use crate::nodes::Node;
use crate::state::{ChatTurnState, FinishReason};
use ragchat_core::settings::{ChatHistorySettings, ErrorMessages, Settings, TimeoutSettings};
use ragchat_core::{bounded_call, AppError, CallPolicy};
use ragchat_knowledge::{Reranker, Retriever, VectorStore};
use ragchat_llm::LlmClient;
use ragchat_prompt::PromptRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tunables of a graph run.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub model: String,
    pub temperature: Option<f32>,
    /// Rephrase attempts after an unhelpful answer
    pub max_retries: u32,
    /// Run language detection and harmfulness screening concurrently
    pub parallel_screening: bool,
    pub history: ChatHistorySettings,
    pub timeouts: TimeoutSettings,
    pub messages: ErrorMessages,
}

impl GraphOptions {
    pub fn from_settings(settings: &Settings, model: impl Into<String>, temperature: Option<f32>) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_retries: settings.graph.max_retries,
            parallel_screening: settings.graph.parallel_screening,
            history: settings.chat_history.clone(),
            timeouts: settings.graph.timeouts.clone(),
            messages: settings.error_messages.clone(),
        }
    }
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), "llama3.2", Some(0.0))
    }
}

/// A turn that hit an unrecoverable dependency failure.
///
/// `state` is final: `finish_reason` is `error` and `answer` holds the
/// generic user-facing message. `source` is for logs only.
#[derive(Debug, thiserror::Error)]
#[error("chat turn aborted: {source}")]
pub struct TurnAborted {
    pub state: Box<ChatTurnState>,
    pub source: AppError,
}

enum Step {
    Next(Node),
    Finish(FinishReason),
}

pub struct ChatGraph {
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) prompts: Arc<PromptRegistry>,
    pub(crate) retriever: Arc<Retriever>,
    pub(crate) reranker: Arc<Reranker>,
    pub(crate) options: GraphOptions,
}

impl ChatGraph {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptRegistry>,
        retriever: Arc<Retriever>,
        reranker: Arc<Reranker>,
        options: GraphOptions,
    ) -> Self {
        Self {
            llm,
            prompts,
            retriever,
            reranker,
            options,
        }
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Drive `state` to a terminal state.
    ///
    /// Recoverable failures end up in `error_messages`; only an
    /// unrecoverable dependency failure or cancellation returns `Err`.
    pub async fn run(
        &self,
        mut state: ChatTurnState,
        cancel: CancellationToken,
    ) -> Result<ChatTurnState, TurnAborted> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = self.drive(&mut state) => result,
        };

        match outcome {
            Ok(()) => Ok(state),
            Err(source) => {
                tracing::error!(
                    session_id = %state.session_id,
                    error = %source,
                    "Chat turn aborted"
                );
                // Details stay in the log and in `TurnAborted::source`.
                state
                    .error_messages
                    .push(format!("graph: aborted ({})", source.kind()));
                state.finish(FinishReason::Error, self.options.messages.generic_error.clone());
                Err(TurnAborted {
                    state: Box::new(state),
                    source,
                })
            }
        }
    }

    async fn drive(&self, state: &mut ChatTurnState) -> Result<(), AppError> {
        if state.question().trim().is_empty() {
            state.finish(FinishReason::NoEvidence, self.options.messages.empty_message.clone());
            return Ok(());
        }

        let mut step = if self.options.parallel_screening {
            *state = self.screen_concurrently(state).await;
            if state.harmful {
                Step::Finish(FinishReason::Blocked)
            } else {
                Step::Next(Node::Rephrase)
            }
        } else {
            Step::Next(Node::LanguageDetect)
        };

        loop {
            match step {
                Step::Next(node) => {
                    tracing::debug!(node = node.name(), retry = state.retry_count, "Entering node");
                    let next = self.invoke(node, state).await?;
                    *state = next;
                    step = self.transition(node, state);
                }
                Step::Finish(reason) => {
                    let answer = self.final_answer(reason, state).await;
                    state.finish(reason, answer);
                    tracing::info!(
                        finish_reason = %reason,
                        retries = state.retry_count,
                        documents = state.reranked_documents.len(),
                        citations = state.citations.len(),
                        "Chat turn finished"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Language detection and harmfulness screening on the same input.
    async fn screen_concurrently(&self, state: &ChatTurnState) -> ChatTurnState {
        let (language, harmfulness) = tokio::join!(
            self.detect_language(state),
            self.check_harmfulness(state)
        );

        let mut next = language;
        next.harmful = harmfulness.harmful;
        next.harmfulness_checked = harmfulness.harmfulness_checked;
        next.error_messages.extend(
            harmfulness
                .error_messages
                .into_iter()
                .skip(state.error_messages.len()),
        );
        next
    }

    fn transition(&self, node: Node, state: &mut ChatTurnState) -> Step {
        match node {
            Node::LanguageDetect => Step::Next(Node::Rephrase),
            Node::Rephrase => Step::Next(Node::HarmfulnessCheck),
            Node::HarmfulnessCheck if state.harmful => Step::Finish(FinishReason::Blocked),
            Node::HarmfulnessCheck => Step::Next(Node::Retrieve),
            Node::Retrieve => Step::Next(Node::Rerank),
            Node::Rerank if state.reranked_documents.is_empty() => {
                Step::Finish(FinishReason::NoEvidence)
            }
            Node::Rerank => Step::Next(Node::GenerateAnswer),
            Node::GenerateAnswer => Step::Next(Node::HelpfulnessCheck),
            Node::HelpfulnessCheck
                if state.helpful || state.retry_count >= self.options.max_retries =>
            {
                Step::Finish(FinishReason::Answered)
            }
            Node::HelpfulnessCheck => {
                state.retry_count += 1;
                tracing::info!(retry = state.retry_count, "Answer not helpful, rephrasing");
                Step::Next(Node::Rephrase)
            }
        }
    }

    async fn final_answer(&self, reason: FinishReason, state: &ChatTurnState) -> String {
        let messages = &self.options.messages;
        match reason {
            FinishReason::Answered => state
                .answer
                .clone()
                .unwrap_or_else(|| messages.no_answer_found.clone()),
            FinishReason::Blocked => messages.harmful_question.clone(),
            FinishReason::Error => messages.generic_error.clone(),
            FinishReason::NoEvidence if !state.retrieved_documents.is_empty() => {
                messages.no_documents_message.clone()
            }
            FinishReason::NoEvidence => {
                let store = self.retriever.store();
                let policy = CallPolicy::no_retry(self.options.timeouts.vector_store_ms);
                match bounded_call("vector_store.available", policy, move || {
                    store.collection_available()
                })
                .await
                {
                    Ok(false) => messages.no_or_empty_collection.clone(),
                    _ => messages.no_documents_message.clone(),
                }
            }
        }
    }
}
