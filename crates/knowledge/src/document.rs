//! Retrievable documents.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Kind of content a document carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Table,
    Summary,
    Image,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Text,
        ContentType::Table,
        ContentType::Summary,
        ContentType::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Summary => "summary",
            ContentType::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ContentType::Text),
            "table" => Some(ContentType::Table),
            "summary" => Some(ContentType::Summary),
            "image" => Some(ContentType::Image),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Name of the source document (e.g., "lbo-2024.pdf")
    #[serde(default)]
    pub document: String,

    /// Source file name without extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Ids of the documents this one summarizes or augments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A retrieved unit of evidence.
///
/// `retrieval_score` comes from hybrid similarity and `rerank_score` from the
/// reranker; the two scales are never mixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content_type: ContentType,
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub retrieval_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl Document {
    /// Create a document whose id is derived from its content.
    pub fn new(
        content_type: ContentType,
        content: impl Into<String>,
        metadata: DocumentMetadata,
    ) -> Self {
        let content = content.into();
        Self {
            id: content_id(&content),
            content_type,
            content,
            metadata,
            retrieval_score: 0.0,
            rerank_score: None,
        }
    }

    /// Score of the last ranking stage this document went through.
    pub fn relevance(&self) -> f32 {
        self.rerank_score.unwrap_or(self.retrieval_score)
    }
}

/// Stable identifier: SHA-256 of the whitespace-normalized content.
pub fn content_id(content: &str) -> String {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_ignores_whitespace_layout() {
        let a = content_id("Berlin is the capital\nof Germany.");
        let b = content_id("  Berlin is the   capital of Germany. ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_id("Bonn was the capital of Germany."));
    }

    #[test]
    fn test_content_id_is_sha256_hex() {
        assert_eq!(
            content_id(" abc\n"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_metadata_round_trips_extra_fields() {
        let json = serde_json::json!({
            "document": "lbo.pdf",
            "page": 3,
            "related": ["abc"],
            "section": "§ 5"
        });
        let metadata: DocumentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(metadata.document, "lbo.pdf");
        assert_eq!(metadata.page, Some(3));
        assert_eq!(metadata.related, vec!["abc"]);
        assert_eq!(metadata.extra["section"], "§ 5");
    }

    #[test]
    fn test_relevance_prefers_rerank_score() {
        let mut doc = Document::new(ContentType::Text, "x", DocumentMetadata::default());
        doc.retrieval_score = 0.4;
        assert_eq!(doc.relevance(), 0.4);
        doc.rerank_score = Some(0.9);
        assert_eq!(doc.relevance(), 0.9);
        assert_eq!(doc.retrieval_score, 0.4);
    }

    #[test]
    fn test_content_type_parse() {
        for ct in ContentType::ALL {
            assert_eq!(ContentType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ContentType::parse("video"), None);
    }
}
