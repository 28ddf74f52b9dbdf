//! Ragchat CLI
//!
//! Main entry point for the ragchat command-line tool.
//! Answers questions from a local document collection with cited sources.

mod app;
mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, KnowledgeCommand};
use ragchat_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Ragchat CLI - grounded answers from your documents
#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(about = "Grounded, cited answers from a local document collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGCHAT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, openai, mock)
    #[arg(short, long, global = true, env = "RAGCHAT_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RAGCHAT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Multi-turn chat over stdin
    Chat(ChatCommand),

    /// Knowledge collection management
    Knowledge(KnowledgeCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from defaults, file and environment
    let mut config = AppConfig::load()?;

    // A config file passed only as a flag was not seen by `load`
    if let Some(path) = cli.config.as_ref() {
        if config.config_file.as_ref() != Some(path) {
            config = config.merge_yaml(path)?;
        }
    }

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.log_json,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("Ragchat CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;
    config.ensure_ragchat_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Knowledge(_) => "knowledge",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Knowledge(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
