//! Vector store contract and brute-force hybrid ranking.
//!
//! A store holds one collection of [`IndexedDocument`]s. `query` returns two
//! independently ranked lists, one per representation; fusing them is the
//! retriever's job. Ranking is stable: equal scores keep insertion order.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::document::{ContentType, Document};
use crate::embeddings::SparseVector;
use crate::filters::DocumentFilters;
use ragchat_core::settings::{VectorDbBackend, VectorDbSettings};
use ragchat_core::AppResult;
use std::path::Path;
use std::sync::Arc;

/// A document with its stored representations.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub document: Document,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// A hybrid similarity query.
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub filters: DocumentFilters,
    /// Restrict to one content type; `None` searches all.
    pub content_type: Option<ContentType>,
    pub top_n: usize,
}

/// Dense and sparse hits, each sorted by its own raw score (stored in
/// `retrieval_score`), best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridResult {
    pub dense: Vec<Document>,
    pub sparse: Vec<Document>,
}

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the collection exists and holds at least one document.
    async fn collection_available(&self) -> AppResult<bool>;

    async fn query(&self, query: &StoreQuery) -> AppResult<HybridResult>;

    /// Fetch documents by id, in the order of `ids`, skipping unknown ids.
    async fn get_by_ids(&self, ids: &[String]) -> AppResult<Vec<Document>>;

    /// Insert documents, replacing any with the same id in place.
    /// Returns the number of documents written.
    async fn upsert(&self, documents: Vec<IndexedDocument>) -> AppResult<usize>;

    /// Delete every document whose `metadata.document` equals `document_name`.
    async fn delete(&self, document_name: &str) -> AppResult<usize>;

    async fn count(&self) -> AppResult<usize>;

    async fn reset(&self) -> AppResult<()>;
}

/// Open the store configured in `settings`.
pub fn open_store(settings: &VectorDbSettings, path: &Path) -> AppResult<Arc<dyn VectorStore>> {
    match settings.backend {
        VectorDbBackend::Memory => Ok(Arc::new(MemoryVectorStore::new(&settings.collection_name))),
        VectorDbBackend::Sqlite => Ok(Arc::new(SqliteVectorStore::open(
            path,
            &settings.collection_name,
        )?)),
    }
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Rank `entries` (in insertion order) against `query`.
pub(crate) fn rank<'a>(
    entries: impl IntoIterator<Item = &'a IndexedDocument>,
    query: &StoreQuery,
) -> HybridResult {
    let candidates: Vec<&IndexedDocument> = entries
        .into_iter()
        .filter(|e| {
            query
                .content_type
                .map_or(true, |ct| e.document.content_type == ct)
        })
        .filter(|e| query.filters.matches(&e.document.metadata))
        .collect();

    let dense = top_n(
        candidates
            .iter()
            .map(|e| (*e, cosine_similarity(&query.dense, &e.dense))),
        query.top_n,
    );
    let sparse = top_n(
        candidates
            .iter()
            .map(|e| (*e, query.sparse.dot(&e.sparse)))
            .filter(|(_, score)| *score > 0.0),
        query.top_n,
    );

    HybridResult { dense, sparse }
}

fn top_n<'a>(scored: impl Iterator<Item = (&'a IndexedDocument, f32)>, n: usize) -> Vec<Document> {
    let mut scored: Vec<_> = scored.collect();
    // sort_by is stable, so ties keep insertion order
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(n)
        .map(|(entry, score)| {
            let mut document = entry.document.clone();
            document.retrieval_score = score;
            document.rerank_score = None;
            document
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_filters_by_type_and_metadata() {
        let entries = vec![
            indexed(ContentType::Text, "Berlin is the capital of Germany.", "geo.pdf"),
            indexed(ContentType::Table, "capital | Berlin", "geo.pdf"),
            indexed(ContentType::Text, "The capital of France is Paris.", "france.pdf"),
        ];

        let mut query = query_for("capital of Germany", 10);
        query.content_type = Some(ContentType::Text);
        query.filters = DocumentFilters::new().with_group("geo", vec!["geo".to_string()]);

        let result = rank(&entries, &query);
        assert_eq!(result.dense.len(), 1);
        assert_eq!(result.dense[0].id, entries[0].document.id);
        assert_eq!(result.sparse.len(), 1);
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let mut first = indexed(ContentType::Text, "garage setback", "a.pdf");
        let mut second = indexed(ContentType::Text, "garage setback rules", "b.pdf");
        first.dense = vec![1.0, 0.0];
        second.dense = vec![1.0, 0.0];

        let query = StoreQuery {
            dense: vec![1.0, 0.0],
            top_n: 2,
            ..Default::default()
        };
        let result = rank([&first, &second], &query);
        assert_eq!(result.dense[0].metadata.document, "a.pdf");
        assert_eq!(result.dense[1].metadata.document, "b.pdf");
        // empty sparse query matches nothing
        assert!(result.sparse.is_empty());
    }

    #[test]
    fn test_rank_truncates_to_top_n() {
        let entries: Vec<_> = (0..5)
            .map(|i| indexed(ContentType::Text, &format!("garage rule {}", i), "a.pdf"))
            .collect();
        let result = rank(&entries, &query_for("garage", 3));
        assert_eq!(result.dense.len(), 3);
        assert_eq!(result.sparse.len(), 3);
    }
}
