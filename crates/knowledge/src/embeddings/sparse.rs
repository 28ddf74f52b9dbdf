//! Sparse lexical embeddings.

use crate::text::{term_hash, terms};
use ragchat_core::settings::SparseEmbedderSettings;
use ragchat_core::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse vector with strictly increasing `indices`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    fn from_weights(weights: BTreeMap<u32, f32>) -> Self {
        let (indices, values) = weights.into_iter().unzip();
        Self { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

pub trait SparseEmbedder: Send + Sync + std::fmt::Debug {
    fn model_name(&self) -> &str;

    /// Embed stored content.
    fn embed_sparse(&self, text: &str) -> AppResult<SparseVector>;

    /// Embed a query. Defaults to the document weighting.
    fn embed_sparse_query(&self, text: &str) -> AppResult<SparseVector> {
        self.embed_sparse(text)
    }
}

/// BM25-weighted hashed term vectors.
///
/// Documents get saturated term frequencies normalized by length; queries get
/// weight 1 per distinct term, so the dot product is the BM25 score without
/// the IDF factor.
#[derive(Debug, Clone)]
pub struct Bm25SparseEmbedder {
    model_name: String,
    k1: f32,
    b: f32,
    avg_doc_len: f32,
}

impl Bm25SparseEmbedder {
    pub fn new(settings: &SparseEmbedderSettings) -> Self {
        Self {
            model_name: settings.model_name.clone(),
            k1: settings.k1,
            b: settings.b,
            avg_doc_len: settings.avg_doc_len.max(1.0),
        }
    }

    fn term_counts(text: &str) -> (BTreeMap<u32, f32>, usize) {
        let terms = terms(text);
        let len = terms.len();
        let mut counts = BTreeMap::new();
        for term in terms {
            *counts.entry(term_hash(&term) as u32).or_insert(0.0) += 1.0;
        }
        (counts, len)
    }
}

impl Default for Bm25SparseEmbedder {
    fn default() -> Self {
        Self::new(&SparseEmbedderSettings::default())
    }
}

impl SparseEmbedder for Bm25SparseEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed_sparse(&self, text: &str) -> AppResult<SparseVector> {
        let (counts, len) = Self::term_counts(text);
        let norm = self.k1 * (1.0 - self.b + self.b * len as f32 / self.avg_doc_len);
        let weights = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * (self.k1 + 1.0) / (tf + norm)))
            .collect();
        Ok(SparseVector::from_weights(weights))
    }

    fn embed_sparse_query(&self, text: &str) -> AppResult<SparseVector> {
        let (counts, _) = Self::term_counts(text);
        let weights = counts.into_keys().map(|index| (index, 1.0)).collect();
        Ok(SparseVector::from_weights(weights))
    }
}
