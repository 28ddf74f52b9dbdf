//! Dense embedding provider trait and factory.

use ragchat_core::settings::EmbedderSettings;
use ragchat_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for dense embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "hash", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create a dense embedding provider from settings.
pub fn create_provider(settings: &EmbedderSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    if settings.dimensions == 0 {
        return Err(AppError::Config(
            "embedder.dimensions must be greater than zero".to_string(),
        ));
    }

    match settings.provider.as_str() {
        "hash" => Ok(Arc::new(super::providers::HashEmbedder::new(
            settings.dimensions,
        ))),

        "ollama" => Ok(Arc::new(super::providers::OllamaEmbedder::new(
            settings.endpoint.as_deref(),
            &settings.model,
            settings.dimensions,
        )?)),

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: hash, ollama",
            settings.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_hash_provider() {
        let settings = EmbedderSettings::default();
        let provider = create_provider(&settings).unwrap();
        assert_eq!(provider.provider_name(), "hash");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn test_create_ollama_provider_is_lazy() {
        let settings = EmbedderSettings {
            provider: "ollama".to_string(),
            endpoint: Some("http://127.0.0.1:1".to_string()),
            dimensions: 768,
            ..Default::default()
        };
        let provider = create_provider(&settings).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_create_unknown_provider() {
        let settings = EmbedderSettings {
            provider: "gguf".to_string(),
            ..Default::default()
        };
        let err = create_provider(&settings).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[tokio::test]
    async fn test_provider_embed_single() {
        let provider = create_provider(&EmbedderSettings::default()).unwrap();
        let embedding = provider.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }
}
