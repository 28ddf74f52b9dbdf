//! Ask command handler.
//!
//! Runs a single chat turn and prints the answer with its sources.

use crate::app::build_chat;
use clap::Args;
use ragchat_core::{config::AppConfig, AppError, AppResult};
use ragchat_graph::{TracedChatGraph, TurnRequest, TurnResponse};
use ragchat_knowledge::DocumentFilters;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Ask a single question against the knowledge collection
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Session id to attach the turn to (generated when omitted)
    #[arg(long)]
    pub session: Option<String>,

    /// Restrict evidence to documents: `group=file-a,file-b` (repeatable)
    #[arg(long = "filter", value_name = "GROUP=FILES")]
    pub filters: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;
        let filters = parse_filters(&self.filters)?;
        let chat = build_chat(config)?;

        let mut request = TurnRequest::new(question);
        request.session_id = self.session.clone();
        request.filters = filters;

        run_turn(&chat, request, self.json).await.map(|_| ())
    }

    fn get_question(&self) -> AppResult<String> {
        match (&self.question, &self.file) {
            (Some(question), _) => Ok(question.clone()),
            (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
            (None, None) => Err(AppError::Config("No question provided".to_string())),
        }
    }
}

/// Parse repeated `--filter group=a,b` arguments.
pub fn parse_filters(pairs: &[String]) -> AppResult<Option<DocumentFilters>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    DocumentFilters::from_pairs(pairs.iter().map(String::as_str))
        .map(Some)
        .ok_or_else(|| AppError::Config("Filters must look like group=file-a,file-b".to_string()))
}

/// Run one turn, cancelling it on Ctrl-C, and print the outcome.
///
/// An aborted turn still prints its generic answer before the error is
/// returned.
pub async fn run_turn(
    chat: &TracedChatGraph,
    request: TurnRequest,
    json: bool,
) -> AppResult<TurnResponse> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling turn");
            on_interrupt.cancel();
        }
    });

    let outcome = chat.handle_turn_with_cancel(request, cancel).await;
    watcher.abort();

    match outcome {
        Ok(response) => {
            print_response(&response, json)?;
            Ok(response)
        }
        Err(aborted) => {
            let response = TurnResponse::from(*aborted.state);
            print_response(&response, json)?;
            Err(aborted.source)
        }
    }
}

fn print_response(response: &TurnResponse, json: bool) -> AppResult<()> {
    if json {
        let output = serde_json::json!({
            "sessionId": response.session_id,
            "answer": response.answer,
            "finishReason": response.finish_reason,
            "language": response.language,
            "citations": response.cited_documents().map(|doc| serde_json::json!({
                "id": doc.id,
                "document": doc.metadata.document,
                "page": doc.metadata.page,
            })).collect::<Vec<_>>(),
            "errors": response.error_messages,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", response.answer);

    let cited: Vec<_> = response.cited_documents().collect();
    if !cited.is_empty() {
        println!();
        println!("Sources:");
        for doc in cited {
            match doc.metadata.page {
                Some(page) => println!("- {} (page {})", doc.metadata.document, page),
                None => println!("- {}", doc.metadata.document),
            }
        }
    }

    tracing::debug!(
        session_id = %response.session_id,
        finish_reason = %response.finish_reason,
        errors = response.error_messages.len(),
        "Turn printed"
    );
    Ok(())
}
