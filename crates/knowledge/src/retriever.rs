//! Hybrid retrieval over a [`VectorStore`].
//!
//! One query runs per content type, each with its own `k` and threshold.
//! Dense and sparse hits of a query are fused into one normalized score in
//! `[0, 1]`. Related documents referenced by hits are appended with the score
//! of the hit that referenced them. Summaries only serve to reach related
//! documents and are dropped from the result. The merged list is sorted
//! (stable), deduplicated by id and capped at `total_k`.

use crate::document::{ContentType, Document};
use crate::embeddings::{EmbeddingProvider, SparseEmbedder};
use crate::filters::DocumentFilters;
use crate::store::{HybridResult, StoreQuery, VectorStore};
use futures::future::try_join_all;
use ragchat_core::settings::{FusionSettings, FusionStrategy, RetrieverSettings, TimeoutSettings};
use ragchat_core::{bounded_call, AppError, AppResult, CallPolicy};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Quark {
    content_type: ContentType,
    threshold: f32,
    k: usize,
}

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    sparse: Arc<dyn SparseEmbedder>,
    settings: RetrieverSettings,
    embedding_policy: CallPolicy,
    store_policy: CallPolicy,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        sparse: Arc<dyn SparseEmbedder>,
        settings: RetrieverSettings,
    ) -> Self {
        let timeouts = TimeoutSettings::default();
        Self {
            store,
            embedder,
            sparse,
            settings,
            embedding_policy: CallPolicy::retry_once(timeouts.embedding_ms),
            store_policy: CallPolicy::retry_once(timeouts.vector_store_ms),
        }
    }

    pub fn with_policies(mut self, embedding: CallPolicy, store: CallPolicy) -> Self {
        self.embedding_policy = embedding;
        self.store_policy = store;
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    fn quarks(&self) -> [Quark; 4] {
        let s = &self.settings;
        [
            Quark {
                content_type: ContentType::Text,
                threshold: s.threshold,
                k: s.k_documents,
            },
            Quark {
                content_type: ContentType::Table,
                threshold: s.table_threshold,
                k: s.table_k_documents,
            },
            Quark {
                content_type: ContentType::Summary,
                threshold: s.summary_threshold,
                k: s.summary_k_documents,
            },
            Quark {
                content_type: ContentType::Image,
                threshold: s.image_threshold,
                k: s.image_k_documents,
            },
        ]
    }

    /// Retrieve candidates for `query`, best first.
    ///
    /// A missing or empty collection yields an empty list. Embedding and store
    /// failures that survive the retry are returned as errors.
    pub async fn retrieve(&self, query: &str, filters: &DocumentFilters) -> AppResult<Vec<Document>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let store = &self.store;
        let available = bounded_call("vector_store.available", self.store_policy, move || {
            store.collection_available()
        })
        .await?;
        if !available {
            tracing::info!(collection = store.name(), "Collection missing or empty");
            return Ok(Vec::new());
        }

        let embedder = &self.embedder;
        let dense = bounded_call("embedder.embed", self.embedding_policy, move || {
            embedder.embed(query)
        })
        .await?;
        let sparse = self.sparse.embed_sparse_query(query)?;

        let quarks = self.quarks();
        let searches = quarks.iter().filter(|q| q.k > 0).map(|quark| {
            let store_query = StoreQuery {
                dense: dense.clone(),
                sparse: sparse.clone(),
                filters: filters.clone(),
                content_type: Some(quark.content_type),
                top_n: quark.k,
            };
            async move {
                let store_query = &store_query;
                let result = bounded_call("vector_store.query", self.store_policy, move || {
                    store.query(store_query)
                })
                .await?;
                let hits = select(fuse(result, &self.settings.fusion), quark);
                tracing::debug!(
                    content_type = %quark.content_type,
                    hits = hits.len(),
                    "Retrieved documents"
                );
                Ok::<_, AppError>(hits)
            }
        });
        let hits: Vec<Document> = try_join_all(searches).await?.into_iter().flatten().collect();

        let related = self.related_documents(&hits).await?;

        let mut candidates: Vec<Document> = hits
            .into_iter()
            .chain(related)
            .filter(|d| d.content_type != ContentType::Summary)
            .collect();
        candidates.sort_by(|a, b| {
            b.retrieval_score
                .partial_cmp(&a.retrieval_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut seen = HashSet::new();
        candidates.retain(|d| seen.insert(d.id.clone()));
        candidates.truncate(self.settings.total_k);

        tracing::debug!(candidates = candidates.len(), "Retrieval finished");
        Ok(candidates)
    }

    /// Fetch documents referenced by `hits` that are not hits themselves.
    async fn related_documents(&self, hits: &[Document]) -> AppResult<Vec<Document>> {
        let hit_ids: HashSet<&str> = hits.iter().map(|d| d.id.as_str()).collect();
        let mut scores: HashMap<String, f32> = HashMap::new();
        let mut ids = Vec::new();
        for hit in hits {
            for id in &hit.metadata.related {
                if hit_ids.contains(id.as_str()) {
                    continue;
                }
                match scores.get_mut(id) {
                    Some(score) => *score = score.max(hit.retrieval_score),
                    None => {
                        scores.insert(id.clone(), hit.retrieval_score);
                        ids.push(id.clone());
                    }
                }
            }
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let store = &self.store;
        let ids = &ids;
        let mut related = bounded_call("vector_store.get_by_ids", self.store_policy, move || {
            store.get_by_ids(ids)
        })
        .await?;
        for document in &mut related {
            document.retrieval_score = scores.get(&document.id).copied().unwrap_or_default();
            document.rerank_score = None;
        }
        Ok(related)
    }
}

/// Combine dense and sparse hits into one list scored in `[0, 1]`, best
/// first. Documents keep the order of first appearance on ties.
pub fn fuse(result: HybridResult, fusion: &FusionSettings) -> Vec<Document> {
    let HybridResult { dense, sparse } = result;

    let mut order: Vec<Document> = Vec::new();
    let mut scores: HashMap<String, f32> = HashMap::new();

    match fusion.strategy {
        FusionStrategy::Weighted => {
            let total = fusion.dense_weight + fusion.sparse_weight;
            let total = if total > 0.0 { total } else { 1.0 };
            let max_sparse = sparse
                .iter()
                .map(|d| d.retrieval_score)
                .fold(0.0f32, f32::max);

            for doc in dense {
                let score = fusion.dense_weight * doc.retrieval_score.clamp(0.0, 1.0) / total;
                scores.insert(doc.id.clone(), score);
                order.push(doc);
            }
            for doc in sparse {
                let normalized = if max_sparse > 0.0 {
                    doc.retrieval_score / max_sparse
                } else {
                    0.0
                };
                let score = fusion.sparse_weight * normalized / total;
                match scores.get_mut(&doc.id) {
                    Some(existing) => *existing += score,
                    None => {
                        scores.insert(doc.id.clone(), score);
                        order.push(doc);
                    }
                }
            }
        }
        FusionStrategy::Rrf => {
            let k = fusion.rrf_k.max(0.0);
            let best = 2.0 / (k + 1.0);
            for list in [dense, sparse] {
                for (rank, doc) in list.into_iter().enumerate() {
                    let score = 1.0 / (k + rank as f32 + 1.0) / best;
                    match scores.get_mut(&doc.id) {
                        Some(existing) => *existing += score,
                        None => {
                            scores.insert(doc.id.clone(), score);
                            order.push(doc);
                        }
                    }
                }
            }
        }
    }

    for doc in &mut order {
        doc.retrieval_score = scores.get(&doc.id).copied().unwrap_or_default();
    }
    order.sort_by(|a, b| {
        b.retrieval_score
            .partial_cmp(&a.retrieval_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

fn select(fused: Vec<Document>, quark: &Quark) -> Vec<Document> {
    fused
        .into_iter()
        .filter(|d| d.retrieval_score >= quark.threshold)
        .take(quark.k)
        .collect()
}
