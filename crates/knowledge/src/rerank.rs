//! Second-pass relevance scoring of retrieved candidates.

use crate::document::Document;
use crate::text::terms;
use ragchat_core::settings::{RerankBackendKind, RerankerSettings};
use ragchat_core::{bounded_call, AppError, AppResult, CallPolicy};
use std::collections::HashSet;
use std::sync::Arc;

/// Scores `(query, document)` pairs. Returns one score per document, in
/// input order.
#[async_trait::async_trait]
pub trait RerankBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, query: &str, documents: &[Document]) -> AppResult<Vec<f32>>;
}

enum RerankMode {
    Noop,
    Scoring {
        backend: Arc<dyn RerankBackend>,
        policy: CallPolicy,
    },
}

/// Reorders candidates by relevance, keeps at most `k_documents` and drops
/// anything scoring below `min_relevance_score`.
///
/// In no-op mode the retrieval order and scores are kept and the same cut is
/// applied to the retrieval score.
pub struct Reranker {
    mode: RerankMode,
    k_documents: usize,
    min_relevance_score: f32,
}

impl Reranker {
    pub fn noop(k_documents: usize, min_relevance_score: f32) -> Self {
        Self {
            mode: RerankMode::Noop,
            k_documents,
            min_relevance_score,
        }
    }

    pub fn scoring(
        backend: Arc<dyn RerankBackend>,
        policy: CallPolicy,
        k_documents: usize,
        min_relevance_score: f32,
    ) -> Self {
        Self {
            mode: RerankMode::Scoring { backend, policy },
            k_documents,
            min_relevance_score,
        }
    }

    pub fn from_settings(settings: &RerankerSettings, policy: CallPolicy) -> AppResult<Self> {
        let (k, min) = (settings.k_documents, settings.min_relevance_score);
        if !settings.enabled {
            return Ok(Self::noop(k, min));
        }

        let backend: Arc<dyn RerankBackend> = match settings.backend {
            RerankBackendKind::None => return Ok(Self::noop(k, min)),
            RerankBackendKind::Lexical => Arc::new(LexicalRerankBackend),
            RerankBackendKind::Http => {
                let endpoint = settings.endpoint.clone().ok_or_else(|| {
                    AppError::Config("reranker.endpoint is required for the http backend".into())
                })?;
                let api_key = settings
                    .api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok());
                Arc::new(HttpRerankBackend::new(
                    endpoint,
                    settings.model.clone(),
                    api_key,
                )?)
            }
        };
        Ok(Self::scoring(backend, policy, k, min))
    }

    pub fn backend_name(&self) -> &str {
        match &self.mode {
            RerankMode::Noop => "noop",
            RerankMode::Scoring { backend, .. } => backend.name(),
        }
    }

    pub async fn rerank(&self, query: &str, candidates: Vec<Document>) -> AppResult<Vec<Document>> {
        let (backend, policy) = match &self.mode {
            RerankMode::Noop => return Ok(self.passthrough(candidates)),
            RerankMode::Scoring { backend, policy } => (backend, *policy),
        };
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let docs = &candidates;
        let scores = bounded_call("reranker.score", policy, move || backend.score(query, docs)).await?;
        if scores.len() != candidates.len() {
            return Err(AppError::Knowledge(format!(
                "Reranker '{}' returned {} scores for {} documents",
                backend.name(),
                scores.len(),
                candidates.len()
            )));
        }

        let mut reranked: Vec<Document> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut doc, score)| {
                doc.rerank_score = Some(score);
                doc
            })
            .collect();
        reranked.sort_by(|a, b| {
            b.relevance()
                .partial_cmp(&a.relevance())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reranked.retain(|d| d.relevance() >= self.min_relevance_score);
        reranked.truncate(self.k_documents);

        tracing::debug!(
            backend = backend.name(),
            kept = reranked.len(),
            "Reranked candidates"
        );
        Ok(reranked)
    }

    /// The no-op cut, also used when a scoring backend fails.
    pub fn passthrough(&self, candidates: Vec<Document>) -> Vec<Document> {
        candidates
            .into_iter()
            .filter(|d| d.retrieval_score >= self.min_relevance_score)
            .take(self.k_documents)
            .collect()
    }
}

/// Fraction of query terms that occur in the document.
#[derive(Debug, Default)]
pub struct LexicalRerankBackend;

#[async_trait::async_trait]
impl RerankBackend for LexicalRerankBackend {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn score(&self, query: &str, documents: &[Document]) -> AppResult<Vec<f32>> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(vec![0.0; documents.len()]);
        }
        Ok(documents
            .iter()
            .map(|doc| {
                let doc_terms: HashSet<String> = terms(&doc.content).into_iter().collect();
                query_terms.intersection(&doc_terms).count() as f32 / query_terms.len() as f32
            })
            .collect())
    }
}

/// Cross-encoder service speaking the common `/rerank` JSON shape.
#[derive(Debug)]
pub struct HttpRerankBackend {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
    api_key: Option<String>,
}

impl HttpRerankBackend {
    pub fn new(endpoint: String, model: Option<String>, api_key: Option<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Knowledge(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl RerankBackend for HttpRerankBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn score(&self, query: &str, documents: &[Document]) -> AppResult<Vec<f32>> {
        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let body = serde_json::json!({ "model": self.model, "query": query, "documents": texts });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Knowledge(format!("Rerank request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Knowledge(format!(
                "Rerank service returned {}",
                status
            )));
        }
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Knowledge(format!("Invalid rerank response: {}", e)))?;
        parse_rerank_response(&json, documents.len())
    }
}

fn parse_rerank_response(json: &serde_json::Value, doc_count: usize) -> AppResult<Vec<f32>> {
    let malformed = |what: &str| AppError::Serialization(format!("Rerank response {}", what));

    let results = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed("is missing results array"))?;

    let mut scores = vec![0.0f32; doc_count];
    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| malformed("result missing index"))? as usize;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| malformed("result missing score"))? as f32;
        if let Some(slot) = scores.get_mut(index) {
            *slot = score;
        }
    }
    Ok(scores)
}
