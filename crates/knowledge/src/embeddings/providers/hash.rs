//! Deterministic offline embedder built on hashed terms and trigrams.

use crate::embeddings::provider::EmbeddingProvider;
use crate::text::{term_hash, terms};
use ragchat_core::AppResult;
use std::collections::HashMap;

/// Content-aware embedder for tests and offline use.
///
/// Each term adds weight to the dimension its hash selects and to one
/// dimension per character trigram, so texts sharing vocabulary land close
/// together. Vectors are normalized to unit length; text without terms maps
/// to the zero vector.
#[derive(Debug)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub(crate) fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];

        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for term in terms(text) {
            *term_freq.entry(term).or_insert(0) += 1;
        }

        for (term, freq) in &term_freq {
            let chars: Vec<char> = term.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let dim = (term_hash(&trigram) as usize) % self.dimensions;
                embedding[dim] += (*freq as f32).sqrt();
            }

            let dim = (term_hash(term) as usize) % self.dimensions;
            embedding[dim] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_name(&self) -> &str {
        "hash-trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_unit_length_and_deterministic() {
        let embedder = HashEmbedder::new(384);
        let first = embedder.embed("Berlin is the capital of Germany").await.unwrap();
        let second = embedder.embed("Berlin is the capital of Germany").await.unwrap();

        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_closer() {
        let embedder = HashEmbedder::new(384);
        let query = embedder.embed("capital of Germany").await.unwrap();
        let related = embedder.embed("Berlin is the capital of Germany.").await.unwrap();
        let unrelated = embedder.embed("Setback distances for garages.").await.unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_stop_words_only_is_zero_vector() {
        let embedder = HashEmbedder::new(64);
        let embedding = embedder.embed("what is the").await.unwrap();
        assert_eq!(embedding.len(), 64);
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashEmbedder::new(128);
        let texts = vec!["alpha beta".to_string(), "gamma delta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed("gamma delta").await.unwrap());
    }
}
