//! SQLite-backed vector store.
//!
//! Documents of every collection share one table; `seq` preserves insertion
//! order across upserts. Similarity is computed in process over the rows of
//! the collection.

use super::{rank, HybridResult, IndexedDocument, StoreQuery, VectorStore};
use crate::document::{ContentType, Document, DocumentMetadata};
use crate::embeddings::SparseVector;
use ragchat_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content TEXT NOT NULL,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL,
    dense BLOB NOT NULL,
    sparse TEXT NOT NULL,
    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(collection, document);
"#;

const COLUMNS: &str = "id, content_type, content, metadata, dense, sparse";

#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    collection: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: &Path, collection: &str) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::VectorStore(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::VectorStore(format!("Failed to open SQLite index: {}", e)))?;
        Self::init(conn, collection, db_path)
    }

    pub fn open_in_memory(collection: &str) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::VectorStore(format!("Failed to open SQLite index: {}", e)))?;
        Self::init(conn, collection, Path::new(":memory:"))
    }

    fn init(conn: Connection, collection: &str, origin: &Path) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::VectorStore(format!("Failed to create tables: {}", e)))?;

        tracing::debug!(collection, "Initialized SQLite vector store at {:?}", origin);
        Ok(Self {
            collection: collection.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let collection = self.collection.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AppError::VectorStore("SQLite connection poisoned".to_string()))?;
            f(&conn, &collection)
        })
        .await
        .map_err(|e| AppError::VectorStore(format!("SQLite task failed: {}", e)))?
    }
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::VectorStore(format!("{}: {}", context, e))
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<IndexedDocument> {
    let conversion = |e: AppError| rusqlite::Error::ToSqlConversionFailure(Box::new(e));

    let content_type: String = row.get(1)?;
    let content_type = ContentType::parse(&content_type).ok_or_else(|| {
        conversion(AppError::VectorStore(format!(
            "Unknown content type: {}",
            content_type
        )))
    })?;

    let metadata_json: String = row.get(3)?;
    let metadata: DocumentMetadata =
        serde_json::from_str(&metadata_json).map_err(|e| conversion(e.into()))?;

    let dense_bytes: Vec<u8> = row.get(4)?;
    let dense = bytes_to_embedding(&dense_bytes).map_err(conversion)?;

    let sparse_json: String = row.get(5)?;
    let sparse: SparseVector =
        serde_json::from_str(&sparse_json).map_err(|e| conversion(e.into()))?;

    Ok(IndexedDocument {
        document: Document {
            id: row.get(0)?,
            content_type,
            content: row.get(2)?,
            metadata,
            retrieval_score: 0.0,
            rerank_score: None,
        },
        dense,
        sparse,
    })
}

fn load_collection(
    conn: &Connection,
    collection: &str,
    content_type: Option<ContentType>,
) -> AppResult<Vec<IndexedDocument>> {
    let sql = format!(
        "SELECT {} FROM documents WHERE collection = ?1 AND (?2 IS NULL OR content_type = ?2) ORDER BY seq",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql).map_err(db_err("Failed to prepare query"))?;
    let rows = stmt
        .query_map(params![collection, content_type.map(|ct| ct.as_str())], read_row)
        .map_err(db_err("Failed to query documents"))?;
    let entries = rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err("Failed to read document"))?;
    Ok(entries)
}

#[async_trait::async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn collection_available(&self) -> AppResult<bool> {
        Ok(self.count().await? > 0)
    }

    async fn query(&self, query: &StoreQuery) -> AppResult<HybridResult> {
        let query = query.clone();
        self.with_conn(move |conn, collection| {
            let entries = load_collection(conn, collection, query.content_type)?;
            let result = rank(&entries, &query);
            tracing::debug!(
                collection,
                scanned = entries.len(),
                dense = result.dense.len(),
                sparse = result.sparse.len(),
                "Queried SQLite vector store"
            );
            Ok(result)
        })
        .await
    }

    async fn get_by_ids(&self, ids: &[String]) -> AppResult<Vec<Document>> {
        let ids = ids.to_vec();
        self.with_conn(move |conn, collection| {
            let sql = format!(
                "SELECT {} FROM documents WHERE collection = ?1 AND id = ?2",
                COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err("Failed to prepare query"))?;
            let mut documents = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(entry) = stmt
                    .query_row(params![collection, id], read_row)
                    .optional()
                    .map_err(db_err("Failed to fetch document"))?
                {
                    documents.push(entry.document);
                }
            }
            Ok(documents)
        })
        .await
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> AppResult<usize> {
        self.with_conn(move |conn, collection| {
            let tx = conn
                .unchecked_transaction()
                .map_err(db_err("Failed to begin transaction"))?;
            for entry in &documents {
                let doc = &entry.document;
                let metadata = serde_json::to_string(&doc.metadata)?;
                let sparse = serde_json::to_string(&entry.sparse)?;
                tx.execute(
                    "INSERT INTO documents (collection, id, content_type, content, document, metadata, dense, sparse)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT (collection, id) DO UPDATE SET
                        content_type = excluded.content_type,
                        content = excluded.content,
                        document = excluded.document,
                        metadata = excluded.metadata,
                        dense = excluded.dense,
                        sparse = excluded.sparse",
                    params![
                        collection,
                        doc.id,
                        doc.content_type.as_str(),
                        doc.content,
                        doc.metadata.document,
                        metadata,
                        embedding_to_bytes(&entry.dense),
                        sparse,
                    ],
                )
                .map_err(db_err("Failed to upsert document"))?;
            }
            tx.commit().map_err(db_err("Failed to commit upsert"))?;
            Ok(documents.len())
        })
        .await
    }

    async fn delete(&self, document_name: &str) -> AppResult<usize> {
        let document_name = document_name.to_string();
        self.with_conn(move |conn, collection| {
            let deleted = conn
                .execute(
                    "DELETE FROM documents WHERE collection = ?1 AND document = ?2",
                    params![collection, document_name],
                )
                .map_err(db_err("Failed to delete documents"))?;
            tracing::info!(collection, document = %document_name, deleted, "Deleted documents");
            Ok(deleted)
        })
        .await
    }

    async fn count(&self) -> AppResult<usize> {
        self.with_conn(|conn, collection| {
            conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get::<_, i64>(0).map(|v| v as usize),
            )
            .map_err(db_err("Failed to count documents"))
        })
        .await
    }

    async fn reset(&self) -> AppResult<()> {
        self.with_conn(|conn, collection| {
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1",
                params![collection],
            )
            .map_err(db_err("Failed to reset collection"))?;
            tracing::info!(collection, "Reset vector store collection");
            Ok(())
        })
        .await
    }
}

/// Convert embedding vector to little-endian bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::VectorStore(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
