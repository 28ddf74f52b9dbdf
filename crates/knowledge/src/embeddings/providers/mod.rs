pub mod hash;
pub mod ollama;

pub use hash::HashEmbedder;
pub use ollama::OllamaEmbedder;
