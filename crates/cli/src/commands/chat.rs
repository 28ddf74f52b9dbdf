//! Chat command handler.
//!
//! Multi-turn conversation over stdin. History and session id carry over
//! between turns; an empty line or EOF ends the session.

use super::ask::{parse_filters, run_turn};
use crate::app::build_chat;
use clap::Args;
use ragchat_core::{config::AppConfig, AppResult};
use ragchat_graph::{truncate_history, ChatExchange, FinishReason, TurnRequest};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive multi-turn chat
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Session id (generated on the first turn when omitted)
    #[arg(long)]
    pub session: Option<String>,

    /// Restrict evidence to documents: `group=file-a,file-b` (repeatable)
    #[arg(long = "filter", value_name = "GROUP=FILES")]
    pub filters: Vec<String>,

    /// Output each turn as JSON
    #[arg(long)]
    pub json: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let filters = parse_filters(&self.filters)?;
        let chat = build_chat(config)?;

        let mut session_id = self.session.clone();
        let history_limit = config.settings.chat_history.limit;
        let mut history: Vec<ChatExchange> = Vec::new();
        let mut turns = 0usize;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if !self.json {
                print!("> ");
                std::io::stdout().flush()?;
            }
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                break;
            }

            let request = TurnRequest {
                session_id: session_id.clone(),
                question: question.to_string(),
                history: history.clone(),
                filters: filters.clone(),
            };

            turns += 1;
            match run_turn(&chat, request, self.json).await {
                Ok(response) => {
                    session_id = Some(response.session_id.clone());
                    // Only answered turns become history.
                    if response.finish_reason == FinishReason::Answered {
                        history.push(ChatExchange::new(question, response.answer));
                        truncate_history(&mut history, history_limit);
                    }
                }
                Err(e) => tracing::error!("Turn failed: {}", e),
            }
            if !self.json {
                println!();
            }
        }

        tracing::info!(turns, "Chat session ended");
        Ok(())
    }
}
