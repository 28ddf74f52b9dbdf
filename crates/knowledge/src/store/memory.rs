//! In-process vector store.

use super::{rank, HybridResult, IndexedDocument, StoreQuery, VectorStore};
use crate::document::Document;
use ragchat_core::AppResult;
use tokio::sync::RwLock;

/// Keeps the collection in a `Vec`, in insertion order.
#[derive(Debug)]
pub struct MemoryVectorStore {
    name: String,
    exists: bool,
    entries: RwLock<Vec<IndexedDocument>>,
}

impl MemoryVectorStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: true,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// A store whose collection was never created.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            exists: false,
            ..Self::new(name)
        }
    }

    pub fn with_documents(name: impl Into<String>, documents: Vec<IndexedDocument>) -> Self {
        Self {
            name: name.into(),
            exists: true,
            entries: RwLock::new(documents),
        }
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collection_available(&self) -> AppResult<bool> {
        Ok(self.exists && !self.entries.read().await.is_empty())
    }

    async fn query(&self, query: &StoreQuery) -> AppResult<HybridResult> {
        let entries = self.entries.read().await;
        Ok(rank(entries.iter(), query))
    }

    async fn get_by_ids(&self, ids: &[String]) -> AppResult<Vec<Document>> {
        let entries = self.entries.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| entries.iter().find(|e| &e.document.id == id))
            .map(|e| e.document.clone())
            .collect())
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> AppResult<usize> {
        let mut entries = self.entries.write().await;
        let written = documents.len();
        for document in documents {
            match entries
                .iter_mut()
                .find(|e| e.document.id == document.document.id)
            {
                Some(existing) => *existing = document,
                None => entries.push(document),
            }
        }
        Ok(written)
    }

    async fn delete(&self, document_name: &str) -> AppResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.document.metadata.document != document_name);
        Ok(before - entries.len())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn reset(&self) -> AppResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
