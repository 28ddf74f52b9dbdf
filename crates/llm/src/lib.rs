//! Language-model integration for ragchat.
//!
//! This crate provides a provider-agnostic `LlmClient` trait, the HTTP
//! providers behind it, a deterministic scripted client for tests, and the
//! credential plumbing (`SecretProvider`, `SecuredLlmClient`).
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **OpenAI-compatible**: any `/v1/chat/completions` endpoint
//! - **Mock**: `ScriptedLlmClient`, replies routed by run name or prompt text
//!
//! # Example
//! ```no_run
//! use ragchat_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2").with_run_name("greeting");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod secrets;
pub mod secured;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient, Reply, ScriptedLlmClient};
pub use secrets::{create_secret_provider, DynamicSecretProvider, NoSecretProvider, SecretProvider, StaticSecretProvider};
pub use secured::SecuredLlmClient;
pub use types::ProviderType;
