//! Ingestion pipeline: extraction → chunking → embedding → indexing.
//!
//! Runs as a background task decoupled from the upload: the caller gets the
//! new document id immediately while the pipeline proceeds and writes the
//! document's terminal `processed` state once on completion. Per-chunk
//! embedding/indexing failures are logged and isolated — the remaining
//! chunks continue and the document still succeeds as long as extraction
//! did. Documents are independent units of work and may be ingested
//! concurrently.

use std::sync::Arc;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::index::IndexEntry;
use crate::models::{Chunk, Document, ProcessingState};
use crate::services::Services;

/// Outcome of one ingestion attempt.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    /// Passages produced by the chunker.
    pub chunk_count: usize,
    /// Chunks actually written to the store; may be less than
    /// `chunk_count` on partial failure.
    pub chunks_created: usize,
    /// Chunks that received a vector-index entry.
    pub chunks_indexed: usize,
    pub state: ProcessingState,
}

/// Create the document row and run the pipeline to completion.
pub async fn ingest_document(
    services: &Services,
    user_id: &str,
    file_name: &str,
    media_type: &str,
    bytes: &[u8],
) -> Result<IngestReport> {
    let doc = new_document(user_id, file_name, media_type, bytes.len());
    services.store.insert_document(&doc).await?;

    let report = run_pipeline(services, &doc, bytes).await;
    services.store.mark_processed(&doc.id, report.state).await?;

    Ok(report)
}

/// Create the document row, then run the pipeline in a background task.
/// Returns the new document id as the immediate acknowledgment along with
/// the task handle.
pub async fn spawn_ingest(
    services: Arc<Services>,
    user_id: &str,
    file_name: &str,
    media_type: &str,
    bytes: Vec<u8>,
) -> Result<(String, JoinHandle<IngestReport>)> {
    let doc = new_document(user_id, file_name, media_type, bytes.len());
    services.store.insert_document(&doc).await?;
    let document_id = doc.id.clone();

    let handle = tokio::spawn(async move {
        let report = run_pipeline(&services, &doc, &bytes).await;
        if let Err(e) = services.store.mark_processed(&doc.id, report.state).await {
            tracing::error!(document = %doc.id, "failed to record processing state: {e}");
        }
        report
    });

    Ok((document_id, handle))
}

fn new_document(user_id: &str, file_name: &str, media_type: &str, byte_size: usize) -> Document {
    Document {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        file_name: file_name.to_string(),
        media_type: media_type.to_string(),
        byte_size: byte_size as i64,
        processed: ProcessingState::Pending,
        created_at: chrono::Utc::now().timestamp(),
    }
}

async fn run_pipeline(services: &Services, doc: &Document, bytes: &[u8]) -> IngestReport {
    let mut report = IngestReport {
        document_id: doc.id.clone(),
        chunk_count: 0,
        chunks_created: 0,
        chunks_indexed: 0,
        state: ProcessingState::Failed,
    };

    let text = match services.extractor.extract(bytes, &doc.media_type).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(document = %doc.id, "extraction failed: {e}");
            return report;
        }
    };

    // extraction succeeded; everything below is partial-tolerant
    report.state = ProcessingState::Succeeded;

    let chunking = &services.config.chunking;
    let passages = chunk_text(&text, chunking.max_chars, chunking.overlap_chars);
    report.chunk_count = passages.len();

    if passages.is_empty() {
        tracing::info!(document = %doc.id, "extraction yielded no passages");
        return report;
    }

    // one embedding strategy per document run, so every stored vector of
    // this document shares a dimensionality
    let (vectors, served_by) = services.embedder.embed_batch(&passages).await;

    for (i, (passage, vector)) in passages.into_iter().zip(vectors).enumerate() {
        let chunk_id = Uuid::new_v4().to_string();
        let hash = hash_text(&passage);

        let entry = IndexEntry {
            id: chunk_id.clone(),
            vector,
            text: passage.clone(),
            user_id: doc.user_id.clone(),
            document_id: doc.id.clone(),
            chunk_index: i as i64,
        };

        let index_ref = match services.index.upsert(&[entry]).await {
            Ok(()) => {
                report.chunks_indexed += 1;
                Some(chunk_id.clone())
            }
            Err(e) => {
                tracing::warn!(document = %doc.id, chunk = i, "indexing failed: {e}");
                None
            }
        };

        let chunk = Chunk {
            id: chunk_id,
            document_id: doc.id.clone(),
            chunk_index: i as i64,
            text: passage,
            index_ref,
            hash,
        };

        match services.store.insert_chunk(&chunk).await {
            Ok(()) => report.chunks_created += 1,
            Err(e) => {
                tracing::warn!(document = %doc.id, chunk = i, "storing chunk failed: {e}");
            }
        }
    }

    tracing::info!(
        document = %doc.id,
        chunks = report.chunks_created,
        indexed = report.chunks_indexed,
        embedding = served_by.as_str(),
        "ingestion complete"
    );

    report
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
