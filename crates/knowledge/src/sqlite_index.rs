//! SQLite-backed vector index for post chunks.
//!
//! Chunks live in one table with the embedding stored as a little-endian
//! `f32` BLOB. Queries are a brute-force cosine scan in insertion order.
//! Every call opens its own connection on the blocking pool and the
//! database runs in WAL mode, so readers never wait on each other and
//! see the last committed write.

use crate::types::{Chunk, ChunkMetadata, IndexStats, ScoredChunk};
use crate::vector_index::{check_vector, cosine_similarity, top_k, VectorIndex};
use blogsearch_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent vector index in a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    path: PathBuf,
    dimensions: usize,
}

impl SqliteIndex {
    /// Open or create the index at `path`.
    ///
    /// An existing database built with a different embedding dimension is
    /// rejected; switching models requires re-indexing the corpus.
    pub fn open(path: &Path, dimensions: usize) -> AppResult<Self> {
        let conn = init_index(path)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Index(format!("Failed to read index metadata: {}", e)))?;

        match stored {
            Some(value) if value != dimensions.to_string() => {
                return Err(AppError::Index(format!(
                    "Index at {:?} was built with {}-dimensional embeddings, configured model has {}. Re-index the posts.",
                    path, value, dimensions
                )));
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('dimensions', ?1)",
                    params![dimensions.to_string()],
                )
                .map_err(|e| AppError::Index(format!("Failed to write index metadata: {}", e)))?;
            }
        }

        tracing::debug!("Opened SQLite index at {:?} ({} dimensions)", path, dimensions);

        Ok(Self {
            path: path.to_path_buf(),
            dimensions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Index(format!("SQLite task failed: {}", e)))?
    }
}

/// Initialize the SQLite index database.
fn init_index(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Index(format!("Failed to create index directory: {}", e)))?;
    }

    let conn = connect(db_path)?;

    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
        .map_err(|e| AppError::Index(format!("Failed to enable WAL: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            post_id TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL,
            indexed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_post ON chunks(post_id);
        "#,
    )
    .map_err(|e| AppError::Index(format!("Failed to create tables: {}", e)))?;

    tracing::debug!("Initialized SQLite index at {:?}", db_path);
    Ok(conn)
}

fn connect(db_path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Index(format!("Failed to open SQLite index: {}", e)))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| AppError::Index(format!("Failed to configure SQLite: {}", e)))?;
    Ok(conn)
}

/// Insert or update a chunk, keeping the original insertion rank.
fn insert_chunk(conn: &Connection, chunk: &Chunk) -> AppResult<()> {
    let embedding_bytes = embedding_to_bytes(&chunk.embedding);
    let metadata_json = serde_json::to_string(&chunk.metadata)?;

    conn.execute(
        "INSERT INTO chunks (id, post_id, content, embedding, metadata, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             post_id = excluded.post_id,
             content = excluded.content,
             embedding = excluded.embedding,
             metadata = excluded.metadata,
             indexed_at = excluded.indexed_at",
        params![
            chunk.id,
            chunk.metadata.post_id,
            chunk.content,
            embedding_bytes,
            metadata_json,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| AppError::Index(format!("Failed to insert chunk: {}", e)))?;

    Ok(())
}

/// Score every chunk against `query_embedding`, in insertion order.
fn scan_chunks(conn: &Connection, query_embedding: &[f32]) -> AppResult<Vec<ScoredChunk>> {
    let mut stmt = conn
        .prepare("SELECT id, content, embedding, metadata FROM chunks ORDER BY seq")
        .map_err(|e| AppError::Index(format!("Failed to prepare query: {}", e)))?;

    let mut rows = stmt
        .query([])
        .map_err(|e| AppError::Index(format!("Failed to query chunks: {}", e)))?;

    let mut hits = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| AppError::Index(format!("Failed to read chunk row: {}", e)))?
    {
        let read = |e: rusqlite::Error| AppError::Index(format!("Malformed chunk row: {}", e));

        let embedding_bytes: Vec<u8> = row.get(2).map_err(read)?;
        let embedding = bytes_to_embedding(&embedding_bytes)?;
        let metadata_json: String = row.get(3).map_err(read)?;
        let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)?;

        hits.push(ScoredChunk {
            id: row.get(0).map_err(read)?,
            content: row.get(1).map_err(read)?,
            metadata,
            score: cosine_similarity(query_embedding, &embedding),
        });
    }

    Ok(hits)
}

/// Convert embedding vector to bytes for storage.
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
        return Err(AppError::Index("Invalid embedding bytes length".to_string()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn count(conn: &Connection, sql: &str) -> AppResult<usize> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|v| v as usize)
        .map_err(|e| AppError::Index(format!("Failed to count chunks: {}", e)))
}

fn last_indexed_at(conn: &Connection) -> AppResult<Option<DateTime<Utc>>> {
    let latest: Option<String> = conn
        .query_row("SELECT MAX(indexed_at) FROM chunks", [], |row| row.get(0))
        .map_err(|e| AppError::Index(format!("Failed to read index time: {}", e)))?;

    latest
        .map(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|e| AppError::Index(format!("Malformed index time '{}': {}", value, e)))
        })
        .transpose()
}

#[async_trait::async_trait]
impl VectorIndex for SqliteIndex {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<ScoredChunk>> {
        check_vector(vector, self.dimensions)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = vector.to_vec();
        let hits = self
            .with_connection(move |conn| scan_chunks(conn, &query_embedding))
            .await?;

        let ranked = top_k(hits, k);
        tracing::debug!("Retrieved {} chunks (requested top-{})", ranked.len(), k);
        Ok(ranked)
    }

    async fn upsert(&self, chunk: &Chunk) -> AppResult<()> {
        self.upsert_batch(std::slice::from_ref(chunk)).await
    }

    async fn upsert_batch(&self, chunks: &[Chunk]) -> AppResult<()> {
        for chunk in chunks {
            check_vector(&chunk.embedding, self.dimensions)?;
        }

        let chunks = chunks.to_vec();
        self.with_connection(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| AppError::Index(format!("Failed to begin transaction: {}", e)))?;
            for chunk in &chunks {
                insert_chunk(&tx, chunk)?;
            }
            tx.commit()
                .map_err(|e| AppError::Index(format!("Failed to commit chunks: {}", e)))
        })
        .await
    }

    async fn delete(&self, chunk_id: &str) -> AppResult<bool> {
        let chunk_id = chunk_id.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM chunks WHERE id = ?1", params![chunk_id])
                .map(|n| n > 0)
                .map_err(|e| AppError::Index(format!("Failed to delete chunk: {}", e)))
        })
        .await
    }

    async fn delete_post(&self, post_id: &str) -> AppResult<usize> {
        let post_id = post_id.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM chunks WHERE post_id = ?1", params![post_id])
                .map_err(|e| AppError::Index(format!("Failed to delete post chunks: {}", e)))
        })
        .await
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        let (chunks, posts, last_indexed_at) = self
            .with_connection(|conn| {
                Ok((
                    count(conn, "SELECT COUNT(*) FROM chunks")?,
                    count(conn, "SELECT COUNT(DISTINCT post_id) FROM chunks")?,
                    last_indexed_at(conn)?,
                ))
            })
            .await?;

        Ok(IndexStats {
            backend: self.backend_name().to_string(),
            chunks,
            posts,
            dimensions: self.dimensions,
            last_indexed_at,
        })
    }

    async fn reset(&self) -> AppResult<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM chunks", [])
                .map_err(|e| AppError::Index(format!("Failed to delete chunks: {}", e)))
        })
        .await?;

        tracing::info!("Reset SQLite index at {:?}", self.path);
        Ok(())
    }
}
