//! Session-scoped entry point for one chat turn.
//!
//! `TracedChatGraph` resolves the session id, opens a trace span for the
//! turn and delegates to [`ChatGraph::run`]. The orchestrator never sees the
//! trace backend; a failing backend only costs the trace.

use crate::graph::{ChatGraph, TurnAborted};
use crate::state::{truncate_history, ChatExchange, ChatTurnState, FinishReason};
use crate::trace::{TraceBackend, TraceSpan};
use ragchat_knowledge::{Document, DocumentFilters};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Input of one chat turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Caller-supplied session; a new one is generated when absent
    #[serde(default)]
    pub session_id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub history: Vec<ChatExchange>,
    #[serde(default)]
    pub filters: Option<DocumentFilters>,
}

impl TurnRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatExchange>) -> Self {
        self.history = history;
        self
    }

    pub fn with_filters(mut self, filters: DocumentFilters) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Result of a finished chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub answer: String,
    pub citations: BTreeSet<String>,
    pub finish_reason: FinishReason,
    pub language: String,
    pub error_messages: Vec<String>,
    /// The evidence the answer was generated from
    pub documents: Vec<Document>,
}

impl From<ChatTurnState> for TurnResponse {
    fn from(state: ChatTurnState) -> Self {
        let finish_reason = state.finish_reason().unwrap_or(FinishReason::Error);
        Self {
            session_id: state.session_id,
            answer: state.answer.unwrap_or_default(),
            citations: state.citations,
            finish_reason,
            language: state.detected_language,
            error_messages: state.error_messages,
            documents: state.reranked_documents,
        }
    }
}

impl TurnResponse {
    /// The cited documents, in evidence order.
    pub fn cited_documents(&self) -> impl Iterator<Item = &Document> {
        self.documents
            .iter()
            .filter(|doc| self.citations.contains(&doc.id))
    }
}

pub struct TracedChatGraph {
    graph: Arc<ChatGraph>,
    backend: Arc<dyn TraceBackend>,
    trace_timeout: Duration,
}

impl TracedChatGraph {
    pub fn new(graph: Arc<ChatGraph>, backend: Arc<dyn TraceBackend>, trace_timeout: Duration) -> Self {
        Self {
            graph,
            backend,
            trace_timeout,
        }
    }

    pub fn graph(&self) -> &ChatGraph {
        &self.graph
    }

    /// Run one turn to completion.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnAborted> {
        self.handle_turn_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run one turn; cancelling `cancel` aborts it with the last committed state.
    pub async fn handle_turn_with_cancel(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnResponse, TurnAborted> {
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = tracing::info_span!("chat_turn", session_id = %session_id);

        async move {
            let mut history = request.history;
            truncate_history(&mut history, self.graph.options().history.limit);
            let input = json!({
                "question": request.question,
                "history_len": history.len(),
            });
            let trace = self.start_trace(&session_id, &input).await;

            let state = ChatTurnState::new(
                session_id,
                request.question,
                history,
                request.filters.unwrap_or_default(),
            );
            let result = self.graph.run(state, cancel).await;

            let output = match &result {
                Ok(state) => trace_output(state),
                Err(aborted) => trace_output(&aborted.state),
            };
            if let Some(trace) = trace {
                self.end_trace(trace, &output).await;
            }

            result.map(TurnResponse::from)
        }
        .instrument(span)
        .await
    }

    async fn start_trace(&self, session_id: &str, input: &Value) -> Option<Box<dyn TraceSpan>> {
        match tokio::time::timeout(self.trace_timeout, self.backend.start_span(session_id, input))
            .await
        {
            Ok(Ok(span)) => Some(span),
            Ok(Err(e)) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Trace start failed, continuing untraced");
                None
            }
            Err(_) => {
                tracing::warn!(backend = self.backend.name(), "Trace start timed out, continuing untraced");
                None
            }
        }
    }

    async fn end_trace(&self, trace: Box<dyn TraceSpan>, output: &Value) {
        match tokio::time::timeout(self.trace_timeout, trace.end(output)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Trace end failed"),
            Err(_) => tracing::warn!("Trace end timed out"),
        }
    }
}

fn trace_output(state: &ChatTurnState) -> Value {
    json!({
        "answer": state.answer,
        "finish_reason": state.finish_reason().map(|r| r.as_str()),
        "language": state.detected_language,
        "rephrased_question": state.rephrased_question,
        "citations": state.citations,
        "retries": state.retry_count,
        "errors": state.error_messages,
    })
}
