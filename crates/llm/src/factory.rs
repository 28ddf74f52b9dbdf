//! LLM provider factory.
//!
//! Maps a provider tag from the config to a client constructor.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient, ScriptedLlmClient};
use crate::types::ProviderType;
use ragchat_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai", "mock")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (required for "openai")
///
/// The mock provider echoes a fixed fallback; scripted behaviour is built
/// directly with `ScriptedLlmClient` in tests.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let endpoint = endpoint.or(provider_type.default_endpoint());

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        ProviderType::OpenAi => {
            let Some(api_key) = api_key else {
                return Err(AppError::Config(
                    "OpenAI provider requires API key".to_string(),
                ));
            };
            let base_url = endpoint.unwrap_or("https://api.openai.com");
            Ok(Arc::new(OpenAiClient::new(base_url, Some(api_key.to_string()))))
        }
        ProviderType::Mock => Ok(Arc::new(
            ScriptedLlmClient::new().with_fallback(r#"{"answer": "", "citations": []}"#),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let client = create_client("ollama", Some("http://localhost:8080"), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_openai_requires_api_key() {
        match create_client("openai", None, None) {
            Err(AppError::Config(msg)) => assert!(msg.contains("requires API key")),
            _ => panic!("Expected error for OpenAI without API key"),
        }
        assert!(create_client("openai", None, Some("sk-test")).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, None) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown provider")),
            _ => panic!("Expected error for unknown provider"),
        }
    }
}
