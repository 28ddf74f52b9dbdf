//! Knowledge command handler.
//!
//! Manages the document collection the chat retrieves from.

use crate::app::Knowledge;
use clap::{Args, Subcommand};
use ragchat_core::{config::AppConfig, settings::VectorDbBackend, AppResult};
use ragchat_knowledge::{collection_stats, import_file};
use std::path::PathBuf;

/// Knowledge collection management
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Import documents from a JSONL file
    Import(KnowledgeImportCommand),
    /// Show collection statistics
    Stats(KnowledgeStatsCommand),
    /// Delete all chunks of one source document
    Delete(KnowledgeDeleteCommand),
    /// Remove every document from the collection
    Reset(KnowledgeResetCommand),
}

/// Import documents
#[derive(Args, Debug)]
pub struct KnowledgeImportCommand {
    /// JSONL file, one `{"content_type", "content", "metadata"}` record per line
    pub path: PathBuf,

    /// Reset the collection before importing
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeImportCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing knowledge import command for {:?}", self.path);
        warn_if_ephemeral(config);

        let knowledge = Knowledge::open(config)?;
        if self.reset {
            knowledge.store.reset().await?;
        }

        let stats = import_file(
            &self.path,
            knowledge.embedder.as_ref(),
            knowledge.sparse.as_ref(),
            knowledge.store.as_ref(),
        )
        .await?;

        if self.json {
            let output = serde_json::json!({
                "collection": knowledge.store.name(),
                "records": stats.records,
                "documents": stats.written,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Imported {} records into '{}' ({} documents) in {:.2}s",
                stats.records,
                knowledge.store.name(),
                stats.written,
                stats.duration_secs
            );
        }

        Ok(())
    }
}

/// Show collection stats
#[derive(Args, Debug)]
pub struct KnowledgeStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing knowledge stats command");

        let knowledge = Knowledge::open(config)?;
        let db_path = match config.settings.vector_db.backend {
            VectorDbBackend::Sqlite => Some(config.vector_db_path()),
            VectorDbBackend::Memory => None,
        };
        let stats = collection_stats(knowledge.store.as_ref(), db_path.as_deref()).await?;

        if self.json {
            let output = serde_json::json!({
                "collection": stats.collection,
                "documents": stats.documents,
                "dbSizeBytes": stats.db_size_bytes,
                "embedder": knowledge.embedder.model_name(),
                "sparseEmbedder": knowledge.sparse.model_name(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Collection: {}", stats.collection);
            println!("  Documents: {}", stats.documents);
            if let Some(size) = stats.db_size_bytes {
                println!("  DB size: {} bytes", size);
            }
            println!("  Embedder: {}", knowledge.embedder.model_name());
        }

        Ok(())
    }
}

/// Delete one source document
#[derive(Args, Debug)]
pub struct KnowledgeDeleteCommand {
    /// Source document name as stored in `metadata.document`
    #[arg(long)]
    pub document: String,
}

impl KnowledgeDeleteCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing knowledge delete command for '{}'", self.document);

        let knowledge = Knowledge::open(config)?;
        let deleted = knowledge.store.delete(&self.document).await?;
        println!(
            "Deleted {} documents of '{}' from '{}'",
            deleted,
            self.document,
            knowledge.store.name()
        );
        Ok(())
    }
}

/// Reset the collection
#[derive(Args, Debug)]
pub struct KnowledgeResetCommand {}

impl KnowledgeResetCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing knowledge reset command");

        let knowledge = Knowledge::open(config)?;
        knowledge.store.reset().await?;
        println!("Collection '{}' reset", knowledge.store.name());
        Ok(())
    }
}

fn warn_if_ephemeral(config: &AppConfig) {
    if config.settings.vector_db.backend == VectorDbBackend::Memory {
        tracing::warn!("vector_db.backend is memory; imported documents are lost on exit");
    }
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            KnowledgeAction::Import(cmd) => cmd.execute(config).await,
            KnowledgeAction::Stats(cmd) => cmd.execute(config).await,
            KnowledgeAction::Delete(cmd) => cmd.execute(config).await,
            KnowledgeAction::Reset(cmd) => cmd.execute(config).await,
        }
    }
}
