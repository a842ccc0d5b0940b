//! Durable document/chunk store backed by SQLite.
//!
//! Used by ingestion to persist pipeline output, by the ask flow for
//! processed-state gating, and by the vector-index fallback path as the
//! scan source when the external index is unavailable.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{Chunk, Document, ProcessingState};

#[derive(Clone)]
pub struct ChunkStore {
    pool: SqlitePool,
}

impl ChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, file_name, media_type, byte_size, processed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.user_id)
        .bind(&doc.file_name)
        .bind(&doc.media_type)
        .bind(doc.byte_size)
        .bind(doc.processed.as_str())
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Single terminal write of a document's processing state. A retried
    /// ingestion overwrites the previous value, never merges.
    pub async fn mark_processed(&self, document_id: &str, state: ProcessingState) -> Result<()> {
        sqlx::query("UPDATE documents SET processed = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, user_id, file_name, media_type, byte_size, processed, created_at \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| document_from_row(&row)))
    }

    pub async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, user_id, file_name, media_type, byte_size, processed, created_at \
             FROM documents WHERE user_id = ? ORDER BY created_at DESC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, index_ref, hash) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.index_ref)
        .bind(&chunk.hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Chunks for the given scope in reading order, limited to `limit`.
    ///
    /// Only chunks of successfully processed documents are returned — a
    /// pending or failed document contributes nothing. This is the scan
    /// source for the vector-index fallback.
    pub async fn chunks_for_scope(
        &self,
        user_id: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let rows = match document_id {
            Some(doc_id) => {
                sqlx::query(
                    r#"
                    SELECT c.id, c.document_id, c.chunk_index, c.text, c.index_ref, c.hash
                    FROM chunks c
                    JOIN documents d ON d.id = c.document_id
                    WHERE d.user_id = ? AND d.processed = 'succeeded' AND c.document_id = ?
                    ORDER BY c.document_id, c.chunk_index
                    LIMIT ?
                    "#,
                )
                .bind(user_id)
                .bind(doc_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT c.id, c.document_id, c.chunk_index, c.text, c.index_ref, c.hash
                    FROM chunks c
                    JOIN documents d ON d.id = c.document_id
                    WHERE d.user_id = ? AND d.processed = 'succeeded'
                    ORDER BY c.document_id, c.chunk_index
                    LIMIT ?
                    "#,
                )
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| Chunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                index_ref: row.get("index_ref"),
                hash: row.get("hash"),
            })
            .collect())
    }

    pub async fn chunk_count(&self, document_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Delete a document and cascade its chunks in one transaction.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Document {
    let processed: String = row.get("processed");
    Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        file_name: row.get("file_name"),
        media_type: row.get("media_type"),
        byte_size: row.get("byte_size"),
        processed: ProcessingState::parse(&processed),
        created_at: row.get("created_at"),
    }
}
