//! Builds the chat graph and knowledge components from the configuration.

use ragchat_core::{config::AppConfig, AppResult, CallPolicy};
use ragchat_graph::{create_trace_backend, ChatGraph, GraphOptions, TracedChatGraph};
use ragchat_knowledge::{
    create_provider, open_store, Bm25SparseEmbedder, EmbeddingProvider, Reranker, Retriever,
    SparseEmbedder, VectorStore,
};
use ragchat_llm::{create_client, create_secret_provider, SecuredLlmClient};
use ragchat_prompt::PromptRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Embedders and store shared by retrieval and import.
pub struct Knowledge {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub sparse: Arc<dyn SparseEmbedder>,
}

impl Knowledge {
    pub fn open(config: &AppConfig) -> AppResult<Self> {
        let settings = &config.settings;
        let store = open_store(&settings.vector_db, &config.vector_db_path())?;
        let embedder = create_provider(&settings.embedder)?;
        let sparse: Arc<dyn SparseEmbedder> =
            Arc::new(Bm25SparseEmbedder::new(&settings.sparse_embedder));

        tracing::debug!(
            store = store.name(),
            embedder = embedder.provider_name(),
            model = embedder.model_name(),
            "Opened knowledge"
        );
        Ok(Self {
            store,
            embedder,
            sparse,
        })
    }
}

/// Wire a traced chat graph for the configured provider and collection.
pub fn build_chat(config: &AppConfig) -> AppResult<TracedChatGraph> {
    let settings = &config.settings;
    let timeouts = &settings.graph.timeouts;

    let provider = config.provider_settings();
    let endpoint = provider.and_then(|p| p.endpoint.as_deref());
    let api_key = config.resolve_api_key();
    let client = create_client(&config.provider, endpoint, api_key.as_deref())?;
    let secrets = create_secret_provider(&settings.secrets)?;
    let llm = Arc::new(SecuredLlmClient::new(client, secrets));

    let prompts = Arc::new(PromptRegistry::for_workspace(&config.workspace)?);

    let knowledge = Knowledge::open(config)?;
    let retriever = Retriever::new(
        knowledge.store,
        knowledge.embedder,
        knowledge.sparse,
        settings.retriever.clone(),
    )
    .with_policies(
        CallPolicy::retry_once(timeouts.embedding_ms),
        CallPolicy::retry_once(timeouts.vector_store_ms),
    );
    let reranker = Reranker::from_settings(
        &settings.reranker,
        CallPolicy::retry_once(timeouts.reranker_ms),
    )?;

    let temperature = provider.and_then(|p| p.temperature);
    let options = GraphOptions::from_settings(settings, config.model.clone(), temperature);

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        reranker = reranker.backend_name(),
        "Chat graph ready"
    );

    let graph = ChatGraph::new(llm, prompts, Arc::new(retriever), Arc::new(reranker), options);
    let backend = create_trace_backend(&settings.tracing)?;
    Ok(TracedChatGraph::new(
        Arc::new(graph),
        backend,
        Duration::from_millis(settings.tracing.timeout_ms),
    ))
}
