//! Typed configuration sections read from `.ragchat/config.yaml`.
//!
//! Every section is optional in the file and every field has a default, so a
//! partial YAML document only overrides what it names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Language-model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderSettings>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("ollama".to_string(), ProviderSettings::default());
        Self {
            active_provider: "ollama".to_string(),
            providers,
        }
    }
}

/// One provider entry under `llm.providers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderSettings {
    pub endpoint: Option<String>,
    pub model: String,
    /// Environment variable holding the API key, if the provider needs one.
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "llama3.2".to_string(),
            api_key_env: None,
            temperature: Some(0.0),
        }
    }
}

/// Dense embedder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
    /// `hash` (deterministic, offline) or `ollama`
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Sparse (BM25-style) embedder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseEmbedderSettings {
    pub model_name: String,
    pub k1: f32,
    pub b: f32,
    /// Assumed average document length in tokens.
    pub avg_doc_len: f32,
}

impl Default for SparseEmbedderSettings {
    fn default() -> Self {
        Self {
            model_name: "bm25".to_string(),
            k1: 1.2,
            b: 0.75,
            avg_doc_len: 256.0,
        }
    }
}

/// How dense and sparse result lists are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    Weighted,
    Rrf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub strategy: FusionStrategy,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    /// Rank constant for reciprocal rank fusion.
    pub rrf_k: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::Weighted,
            dense_weight: 0.7,
            sparse_weight: 0.3,
            rrf_k: 60.0,
        }
    }
}

/// Retriever settings, one `(threshold, k)` pair per content type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverSettings {
    pub threshold: f32,
    pub k_documents: usize,
    pub total_k: usize,
    pub table_threshold: f32,
    pub table_k_documents: usize,
    pub summary_threshold: f32,
    pub summary_k_documents: usize,
    pub image_threshold: f32,
    pub image_k_documents: usize,
    pub fusion: FusionSettings,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            k_documents: 10,
            total_k: 10,
            table_threshold: 0.37,
            table_k_documents: 10,
            summary_threshold: 0.5,
            summary_k_documents: 10,
            image_threshold: 0.5,
            image_k_documents: 10,
            fusion: FusionSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankBackendKind {
    None,
    Lexical,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub enabled: bool,
    pub backend: RerankBackendKind,
    pub k_documents: usize,
    pub min_relevance_score: f32,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RerankBackendKind::Lexical,
            k_documents: 5,
            min_relevance_score: 0.0,
            endpoint: None,
            model: None,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatHistorySettings {
    /// Number of prior turns rendered into prompts.
    pub limit: usize,
    /// Render the most recent turn first.
    pub reverse: bool,
}

impl Default for ChatHistorySettings {
    fn default() -> Self {
        Self {
            limit: 4,
            reverse: true,
        }
    }
}

/// Per-call deadlines in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub llm_ms: u64,
    pub embedding_ms: u64,
    pub vector_store_ms: u64,
    pub reranker_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            llm_ms: 60_000,
            embedding_ms: 10_000,
            vector_store_ms: 10_000,
            reranker_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub max_retries: u32,
    /// Run language detection and harmfulness screening concurrently.
    pub parallel_screening: bool,
    pub timeouts: TimeoutSettings,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_retries: 1,
            parallel_screening: false,
            timeouts: TimeoutSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorDbBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbSettings {
    pub backend: VectorDbBackend,
    pub collection_name: String,
    /// Database file for the sqlite backend; defaults to `.ragchat/vectors.db`.
    pub path: Option<PathBuf>,
}

impl Default for VectorDbSettings {
    fn default() -> Self {
        Self {
            backend: VectorDbBackend::Sqlite,
            collection_name: "ragchat".to_string(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    None,
    Static,
    Oauth2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    pub kind: SecretKind,
    /// Environment variable holding the static API key.
    pub api_key_env: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret_env: Option<String>,
    pub scope: Option<String>,
    /// Refresh this many seconds before the token expires.
    pub refresh_margin_secs: u64,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            kind: SecretKind::None,
            api_key_env: None,
            token_url: None,
            client_id: None,
            client_secret_env: None,
            scope: None,
            refresh_margin_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceBackendKind {
    None,
    Log,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingSettings {
    pub backend: TraceBackendKind,
    pub host: Option<String>,
    pub public_key_env: Option<String>,
    pub secret_key_env: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            backend: TraceBackendKind::Log,
            host: None,
            public_key_env: Some("LANGFUSE_PUBLIC_KEY".to_string()),
            secret_key_env: Some("LANGFUSE_SECRET_KEY".to_string()),
            timeout_ms: 2_000,
        }
    }
}

/// User-facing texts for the non-answer outcomes of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorMessages {
    pub empty_message: String,
    pub no_documents_message: String,
    pub no_or_empty_collection: String,
    pub harmful_question: String,
    pub no_answer_found: String,
    pub generic_error: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            empty_message: "Please ask a question.".to_string(),
            no_documents_message:
                "I'm sorry, my answers are limited. You have to ask the right questions."
                    .to_string(),
            no_or_empty_collection:
                "I'm sorry, no documents have been provided that I could search.".to_string(),
            harmful_question: "I'm sorry, but I cannot respond to harmful requests.".to_string(),
            no_answer_found:
                "I'm sorry, I could not find an answer in the context provided to me.".to_string(),
            generic_error: "Something went wrong while answering. Please try again later."
                .to_string(),
        }
    }
}

/// All graph-related sections, as found in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub embedder: EmbedderSettings,
    pub sparse_embedder: SparseEmbedderSettings,
    pub retriever: RetrieverSettings,
    pub reranker: RerankerSettings,
    pub chat_history: ChatHistorySettings,
    pub graph: GraphSettings,
    pub vector_db: VectorDbSettings,
    pub secrets: SecretSettings,
    pub tracing: TracingSettings,
    pub error_messages: ErrorMessages,
}

impl Settings {
    /// Reject values that would make a turn misbehave at runtime.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama", "openai", "mock"];
        if !known_providers.contains(&self.llm.active_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.active_provider,
                known_providers.join(", ")
            )));
        }

        let known_embedders = ["hash", "ollama"];
        if !known_embedders.contains(&self.embedder.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedder: {}. Supported: {}",
                self.embedder.provider,
                known_embedders.join(", ")
            )));
        }
        if self.embedder.dimensions == 0 {
            return Err(AppError::Config(
                "embedder.dimensions must be positive".to_string(),
            ));
        }

        let r = &self.retriever;
        for (name, k) in [
            ("retriever.k_documents", r.k_documents),
            ("retriever.total_k", r.total_k),
            ("retriever.table_k_documents", r.table_k_documents),
            ("retriever.summary_k_documents", r.summary_k_documents),
            ("retriever.image_k_documents", r.image_k_documents),
            ("reranker.k_documents", self.reranker.k_documents),
        ] {
            if k == 0 {
                return Err(AppError::Config(format!("{} must be positive", name)));
            }
        }

        if r.fusion.dense_weight < 0.0 || r.fusion.sparse_weight < 0.0 {
            return Err(AppError::Config(
                "retriever.fusion weights must not be negative".to_string(),
            ));
        }
        if r.fusion.rrf_k <= 0.0 {
            return Err(AppError::Config(
                "retriever.fusion.rrf_k must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.reranker.min_relevance_score) {
            return Err(AppError::Config(
                "reranker.min_relevance_score must be within [0, 1]".to_string(),
            ));
        }
        if self.reranker.enabled
            && self.reranker.backend == RerankBackendKind::Http
            && self.reranker.endpoint.is_none()
        {
            return Err(AppError::Config(
                "reranker.endpoint is required for the http backend".to_string(),
            ));
        }

        if self.secrets.kind == SecretKind::Oauth2
            && (self.secrets.token_url.is_none() || self.secrets.client_id.is_none())
        {
            return Err(AppError::Config(
                "secrets.token_url and secrets.client_id are required for oauth2".to_string(),
            ));
        }

        if self.tracing.backend == TraceBackendKind::Http && self.tracing.host.is_none() {
            return Err(AppError::Config(
                "tracing.host is required for the http backend".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.retriever.threshold, 0.5);
        assert_eq!(settings.retriever.table_threshold, 0.37);
        assert_eq!(settings.retriever.fusion.strategy, FusionStrategy::Weighted);
        assert_eq!(settings.reranker.k_documents, 5);
        assert_eq!(settings.chat_history.limit, 4);
        assert!(settings.chat_history.reverse);
        assert_eq!(settings.graph.max_retries, 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
retriever:
  total_k: 7
  fusion:
    strategy: rrf
reranker:
  backend: none
graph:
  max_retries: 3
  timeouts:
    llm_ms: 1500
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.retriever.total_k, 7);
        assert_eq!(settings.retriever.k_documents, 10);
        assert_eq!(settings.retriever.fusion.strategy, FusionStrategy::Rrf);
        assert_eq!(settings.retriever.fusion.rrf_k, 60.0);
        assert_eq!(settings.reranker.backend, RerankBackendKind::None);
        assert_eq!(settings.graph.max_retries, 3);
        assert_eq!(settings.graph.timeouts.llm_ms, 1500);
        assert_eq!(settings.graph.timeouts.embedding_ms, 10_000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.reranker.k_documents = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.reranker.min_relevance_score = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retriever.fusion.sparse_weight = -0.1;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.llm.active_provider = "unknown".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.secrets.kind = SecretKind::Oauth2;
        assert!(settings.validate().is_err());
    }
}
