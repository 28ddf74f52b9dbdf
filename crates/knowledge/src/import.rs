//! Loading pre-chunked documents into a vector store.
//!
//! Input is JSON Lines, one record per line:
//! `{"content_type": "text", "content": "...", "metadata": {"document": "lbo.pdf", "page": 3}}`.
//! `content_type` defaults to `text`. Blank lines are skipped.

use crate::document::{ContentType, Document, DocumentMetadata};
use crate::embeddings::{EmbeddingProvider, SparseEmbedder};
use crate::store::{IndexedDocument, VectorStore};
use ragchat_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

const BATCH_SIZE: usize = 32;

#[derive(Debug, Deserialize)]
struct ImportRecord {
    #[serde(default = "default_content_type")]
    content_type: ContentType,
    content: String,
    #[serde(default)]
    metadata: DocumentMetadata,
}

fn default_content_type() -> ContentType {
    ContentType::Text
}

/// Import statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStats {
    /// Number of records read
    pub records: usize,

    /// Number of documents written (after id deduplication)
    pub written: usize,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Collection statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection: String,
    pub documents: usize,
    /// Size of the backing file, when there is one
    pub db_size_bytes: Option<u64>,
}

/// Parse JSONL `contents` into documents. Line numbers in errors are 1-based.
pub fn parse_records(contents: &str) -> AppResult<Vec<Document>> {
    let mut documents = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(line).map_err(|e| {
            AppError::Knowledge(format!("Invalid record on line {}: {}", line_no + 1, e))
        })?;
        if record.content.trim().is_empty() {
            return Err(AppError::Knowledge(format!(
                "Empty content on line {}",
                line_no + 1
            )));
        }
        documents.push(Document::new(
            record.content_type,
            record.content,
            record.metadata,
        ));
    }
    Ok(documents)
}

/// Embed `documents` and upsert them in batches.
pub async fn import_documents(
    documents: Vec<Document>,
    embedder: &dyn EmbeddingProvider,
    sparse: &dyn SparseEmbedder,
    store: &dyn VectorStore,
) -> AppResult<ImportStats> {
    let start = Instant::now();
    let records = documents.len();

    tracing::info!(
        "Importing {} documents into '{}' using embedder '{}' (model: {})",
        records,
        store.name(),
        embedder.provider_name(),
        embedder.model_name()
    );

    for batch in documents.chunks(BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
        let dense = embedder.embed_batch(&texts).await?;
        if dense.len() != batch.len() {
            return Err(AppError::Embedding(format!(
                "Embedder returned {} vectors for {} texts",
                dense.len(),
                batch.len()
            )));
        }

        let indexed = batch
            .iter()
            .zip(dense)
            .map(|(document, dense)| {
                Ok(IndexedDocument {
                    sparse: sparse.embed_sparse(&document.content)?,
                    document: document.clone(),
                    dense,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        store.upsert(indexed).await?;
    }

    let written = store.count().await?;
    let duration = start.elapsed();

    tracing::info!(
        "Import completed: {} records, {} documents in collection, {:.2}s",
        records,
        written,
        duration.as_secs_f64()
    );

    Ok(ImportStats {
        records,
        written,
        duration_secs: duration.as_secs_f64(),
    })
}

/// Read a JSONL file and import it.
pub async fn import_file(
    path: &Path,
    embedder: &dyn EmbeddingProvider,
    sparse: &dyn SparseEmbedder,
    store: &dyn VectorStore,
) -> AppResult<ImportStats> {
    let contents = tokio::fs::read_to_string(path).await?;
    let documents = parse_records(&contents)?;
    import_documents(documents, embedder, sparse, store).await
}

pub async fn collection_stats(
    store: &dyn VectorStore,
    db_path: Option<&Path>,
) -> AppResult<CollectionStats> {
    let db_size_bytes = match db_path {
        Some(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
        None => None,
    };
    Ok(CollectionStats {
        collection: store.name().to_string(),
        documents: store.count().await?,
        db_size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Bm25SparseEmbedder, HashEmbedder};
    use crate::store::{MemoryVectorStore, SqliteVectorStore};
    use tempfile::TempDir;

    const RECORDS: &str = r#"
{"content": "Berlin is the capital of Germany.", "metadata": {"document": "geo.pdf", "page": 1}}
{"content_type": "table", "content": "country | capital\nGermany | Berlin", "metadata": {"document": "geo.pdf"}}

{"content": "Berlin is the capital of Germany.", "metadata": {"document": "geo.pdf", "page": 1}}
"#;

    #[test]
    fn test_parse_records() {
        let docs = parse_records(RECORDS).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[1].content_type, ContentType::Table);
        assert_eq!(docs[0].id, docs[2].id);
        assert_eq!(docs[0].metadata.page, Some(1));
    }

    #[test]
    fn test_parse_records_reports_line() {
        let err = parse_records("{\"content\": \"ok\"}\n{oops}").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = parse_records("{\"content\": \"  \"}").unwrap_err();
        assert!(err.to_string().contains("Empty content on line 1"));
    }

    #[tokio::test]
    async fn test_import_deduplicates_by_content() {
        let store = MemoryVectorStore::new("ragchat");
        let stats = import_documents(
            parse_records(RECORDS).unwrap(),
            &HashEmbedder::new(64),
            &Bm25SparseEmbedder::default(),
            &store,
        )
        .await
        .unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(stats.written, 2);
        assert!(store.collection_available().await.unwrap());
    }

    #[tokio::test]
    async fn test_import_file_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("docs.jsonl");
        std::fs::write(&input, RECORDS).unwrap();
        let db_path = temp_dir.path().join("vectors.db");
        let store = SqliteVectorStore::open(&db_path, "ragchat").unwrap();

        import_file(
            &input,
            &HashEmbedder::new(64),
            &Bm25SparseEmbedder::default(),
            &store,
        )
        .await
        .unwrap();

        let stats = collection_stats(&store, Some(&db_path)).await.unwrap();
        assert_eq!(stats.collection, "ragchat");
        assert_eq!(stats.documents, 2);
        assert!(stats.db_size_bytes.unwrap() > 0);
    }
}
