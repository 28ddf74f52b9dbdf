//! Dense and sparse embedders used for hybrid retrieval.

pub mod provider;
pub mod providers;
pub mod sparse;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{HashEmbedder, OllamaEmbedder};
pub use sparse::{Bm25SparseEmbedder, SparseEmbedder, SparseVector};
