//! Graph nodes.
//!
//! Every node maps the current state to a new one. Language detection,
//! rephrasing, harmfulness screening, reranking and helpfulness evaluation
//! never fail: errors become an `error_messages` entry plus a fallback.
//! Retrieval and answer generation propagate dependency failures, which abort
//! the turn.

use crate::graph::ChatGraph;
use crate::parse::{extract_language, parse_generated_answer_strict, parse_verdict, strip_code_fences};
use crate::state::ChatTurnState;
use ragchat_core::{bounded_call, AppResult, CallPolicy};
use ragchat_knowledge::Document;
use ragchat_llm::{LlmClient, LlmRequest};
use ragchat_prompt::registry::{
    ANSWER_GENERATION, HARMFULNESS, HELPFULNESS, LANGUAGE_DETECTION, REPHRASING,
};
use std::collections::HashMap;

/// Characters of each document passed to the helpfulness check.
const CONDENSED_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    LanguageDetect,
    Rephrase,
    HarmfulnessCheck,
    Retrieve,
    Rerank,
    GenerateAnswer,
    HelpfulnessCheck,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::LanguageDetect => "language_detect",
            Node::Rephrase => "rephrase",
            Node::HarmfulnessCheck => "harmfulness_check",
            Node::Retrieve => "retrieve",
            Node::Rerank => "rerank",
            Node::GenerateAnswer => "generate_answer",
            Node::HelpfulnessCheck => "helpfulness_check",
        }
    }
}

fn vars<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Numbered context block for answer generation.
fn render_context(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let mut source = doc.metadata.document.clone();
            if let Some(page) = doc.metadata.page {
                source.push_str(&format!(", page {}", page));
            }
            format!("[{}] ({}) {}", i + 1, source, doc.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn condense_context(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| {
            let snippet: String = doc.content.chars().take(CONDENSED_SNIPPET_CHARS).collect();
            format!("- {}", snippet.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl ChatGraph {
    pub(crate) async fn invoke(&self, node: Node, state: &ChatTurnState) -> AppResult<ChatTurnState> {
        let next = match node {
            Node::LanguageDetect => self.detect_language(state).await,
            Node::Rephrase => self.rephrase(state).await,
            Node::HarmfulnessCheck => self.check_harmfulness(state).await,
            Node::Retrieve => self.retrieve(state).await?,
            Node::Rerank => self.rerank(state).await,
            Node::GenerateAnswer => self.generate_answer(state).await?,
            Node::HelpfulnessCheck => self.check_helpfulness(state).await,
        };
        tracing::debug!(node = node.name(), errors = next.error_messages.len(), "Node finished");
        Ok(next)
    }

    /// Render prompt `prompt_id` and run it, bounded by the LLM call policy.
    async fn complete(
        &self,
        prompt_id: &str,
        variables: &HashMap<String, String>,
        state: &ChatTurnState,
    ) -> AppResult<String> {
        let built = self.prompts.render(prompt_id, variables)?;

        let mut request = LlmRequest::new(built.user, self.options.model.clone())
            .with_run_name(prompt_id)
            .with_trace_id(state.session_id.clone());
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = self.options.temperature {
            request = request.with_temperature(temperature);
        }

        let llm = &self.llm;
        let request = &request;
        let policy = CallPolicy::retry_once(self.options.timeouts.llm_ms);
        let response = bounded_call(prompt_id, policy, move || llm.complete(request)).await?;
        Ok(response.content)
    }

    pub(crate) async fn detect_language(&self, state: &ChatTurnState) -> ChatTurnState {
        let mut next = state.clone();
        let variables = vars([("question", state.question().to_string())]);

        match self.complete(LANGUAGE_DETECTION, &variables, state).await {
            Ok(raw) => match extract_language(&raw) {
                Some(code) => next.detected_language = code,
                None => {
                    next.detected_language = "en".to_string();
                    next.record_error(
                        Node::LanguageDetect.name(),
                        format!("unparseable language {:?}, defaulting to en", raw.trim()),
                    );
                }
            },
            Err(err) => {
                next.detected_language = "en".to_string();
                next.record_error(Node::LanguageDetect.name(), err);
            }
        }
        next
    }

    async fn rephrase(&self, state: &ChatTurnState) -> ChatTurnState {
        let mut next = state.clone();
        let mut variables = vars([
            ("question", state.question().to_string()),
            ("history", state.render_history(&self.options.history)),
            ("language", state.detected_language.clone()),
        ]);
        if state.retry_count > 0 {
            variables.insert("previous_rephrase".to_string(), state.rephrased_question.clone());
        }

        match self.complete(REPHRASING, &variables, state).await {
            Ok(raw) => {
                let rephrased = strip_code_fences(&raw)
                    .trim_matches(|c: char| c == '"' || c.is_whitespace())
                    .to_string();
                if rephrased.is_empty() {
                    next.rephrased_question = state.question().to_string();
                    next.record_error(Node::Rephrase.name(), "empty rephrasing, using original question");
                } else {
                    next.rephrased_question = rephrased;
                }
            }
            Err(err) => {
                next.rephrased_question = state.question().to_string();
                next.record_error(Node::Rephrase.name(), err);
            }
        }
        next
    }

    /// Screens the question once per turn.
    ///
    /// An unparseable verdict counts as not harmful: a broken screening model
    /// must not block legitimate questions. The failure is still recorded.
    pub(crate) async fn check_harmfulness(&self, state: &ChatTurnState) -> ChatTurnState {
        if state.harmfulness_checked {
            return state.clone();
        }

        let mut next = state.clone();
        let variables = vars([
            ("question", state.question().to_string()),
            ("history", state.render_history(&self.options.history)),
        ]);

        let harmful = match self.complete(HARMFULNESS, &variables, state).await {
            Ok(raw) => parse_verdict(&raw, "harmful").unwrap_or_else(|| {
                next.record_error(
                    Node::HarmfulnessCheck.name(),
                    format!("unparseable verdict {:?}, treating as not harmful", raw.trim()),
                );
                false
            }),
            Err(err) => {
                next.record_error(Node::HarmfulnessCheck.name(), err);
                false
            }
        };
        next.harmful = harmful;
        next.harmfulness_checked = true;
        next
    }

    async fn retrieve(&self, state: &ChatTurnState) -> AppResult<ChatTurnState> {
        let mut next = state.clone();
        next.retrieved_documents = self
            .retriever
            .retrieve(&state.rephrased_question, &state.filters)
            .await?;
        next.reranked_documents.clear();
        tracing::debug!(documents = next.retrieved_documents.len(), "Retrieved candidates");
        Ok(next)
    }

    async fn rerank(&self, state: &ChatTurnState) -> ChatTurnState {
        let mut next = state.clone();
        let candidates = state.retrieved_documents.clone();

        next.reranked_documents = match self
            .reranker
            .rerank(&state.rephrased_question, candidates.clone())
            .await
        {
            Ok(documents) => documents,
            Err(err) => {
                next.record_error(Node::Rerank.name(), err);
                self.reranker.passthrough(candidates)
            }
        };
        next
    }

    async fn generate_answer(&self, state: &ChatTurnState) -> AppResult<ChatTurnState> {
        let mut next = state.clone();
        let documents = &state.reranked_documents;
        let variables = vars([
            ("question", state.rephrased_question.clone()),
            ("history", state.render_history(&self.options.history)),
            ("context", render_context(documents)),
            ("language", state.detected_language.clone()),
        ]);

        let raw = self.complete(ANSWER_GENERATION, &variables, state).await?;
        let (answer, citations) = match parse_generated_answer_strict(&raw, documents) {
            Some(parsed) => parsed,
            None => {
                next.record_error(
                    Node::GenerateAnswer.name(),
                    "unstructured answer, citations unavailable",
                );
                (strip_code_fences(&raw), Default::default())
            }
        };

        if answer.is_empty() {
            next.record_error(Node::GenerateAnswer.name(), "empty answer");
            next.answer = Some(self.options.messages.no_answer_found.clone());
            next.citations.clear();
        } else {
            next.answer = Some(answer);
            next.citations = citations;
        }
        Ok(next)
    }

    /// An unparseable verdict counts as helpful so the retry loop ends.
    async fn check_helpfulness(&self, state: &ChatTurnState) -> ChatTurnState {
        let mut next = state.clone();
        let variables = vars([
            ("question", state.question().to_string()),
            ("rephrased_question", state.rephrased_question.clone()),
            ("answer", state.answer.clone().unwrap_or_default()),
            ("context", condense_context(&state.reranked_documents)),
        ]);

        let helpful = match self.complete(HELPFULNESS, &variables, state).await {
            Ok(raw) => parse_verdict(&raw, "helpful").unwrap_or_else(|| {
                next.record_error(
                    Node::HelpfulnessCheck.name(),
                    format!("unparseable verdict {:?}, assuming helpful", raw.trim()),
                );
                true
            }),
            Err(err) => {
                next.record_error(Node::HelpfulnessCheck.name(), err);
                true
            }
        };
        next.helpful = helpful;
        next
    }
}
