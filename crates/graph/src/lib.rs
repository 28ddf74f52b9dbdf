//! Ragchat Graph
//!
//! The per-turn answer-generation graph: language detection, rephrasing,
//! harmfulness screening, retrieval, reranking, answer generation and
//! helpfulness evaluation, with a tracing wrapper around the whole turn.

pub mod graph;
pub mod nodes;
pub mod parse;
pub mod state;
pub mod trace;
pub mod traced;

pub use graph::{ChatGraph, GraphOptions, TurnAborted};
pub use nodes::Node;
pub use state::{truncate_history, ChatExchange, ChatTurnState, FinishReason};
pub use trace::{
    create_trace_backend, HttpTraceBackend, LogTraceBackend, NoopTraceBackend, TraceBackend,
    TraceSpan,
};
pub use traced::{TracedChatGraph, TurnRequest, TurnResponse};
