//! Evidence retrieval for the chat graph.
//!
//! Documents live in a [`VectorStore`] with a dense and a sparse
//! representation each. The [`Retriever`] runs hybrid queries per content
//! type and the [`Reranker`] rescores the merged candidates.

pub mod document;
pub mod embeddings;
pub mod filters;
pub mod import;
pub mod rerank;
pub mod retriever;
pub mod store;
pub mod text;

// Re-export commonly used types
pub use document::{content_id, ContentType, Document, DocumentMetadata};
pub use embeddings::{
    create_provider, Bm25SparseEmbedder, EmbeddingProvider, HashEmbedder, OllamaEmbedder,
    SparseEmbedder, SparseVector,
};
pub use filters::DocumentFilters;
pub use import::{collection_stats, import_documents, import_file, parse_records, CollectionStats, ImportStats};
pub use rerank::{HttpRerankBackend, LexicalRerankBackend, RerankBackend, Reranker};
pub use retriever::{fuse, Retriever};
pub use store::{
    open_store, HybridResult, IndexedDocument, MemoryVectorStore, SqliteVectorStore, StoreQuery,
    VectorStore,
};
