//! Core data models used throughout askdoc.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and question-answering pipeline.

use serde::{Deserialize, Serialize};

/// Processing state of an uploaded document.
///
/// Set to `Pending` on upload and moved to exactly one terminal state by the
/// ingestion pipeline. A document is only queryable once it is `Succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Pending,
    Succeeded,
    Failed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Succeeded => "succeeded",
            ProcessingState::Failed => "failed",
        }
    }

    /// Parse the stored column value. Unknown values read as `Pending` so a
    /// half-written row is never treated as queryable.
    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => ProcessingState::Succeeded,
            "failed" => ProcessingState::Failed,
            _ => ProcessingState::Pending,
        }
    }
}

/// An uploaded document as stored in SQLite.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub media_type: String,
    pub byte_size: i64,
    pub processed: ProcessingState,
    pub created_at: i64,
}

/// A bounded passage of a document's extracted text.
///
/// Immutable once created; `index_ref` is the opaque id of the passage's
/// vector-index entry, NULL when indexing fell back to the durable store.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub index_ref: Option<String>,
    pub hash: String,
}

/// Which strategy produced a result: the primary external service or the
/// local reduced-fidelity fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedBy {
    Primary,
    Fallback,
}

impl ServedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedBy::Primary => "primary",
            ServedBy::Fallback => "fallback",
        }
    }
}

/// A scored passage returned from retrieval, ephemeral per query.
///
/// `score` is in [0,1] (1 = identical, 0 = unrelated); when the index
/// fallback served the query the scores are synthetic descending ranks
/// rather than true similarity.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
    pub served_by: ServedBy,
}

/// Speaker role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of prior conversation, supplied by the caller as ordered
/// history. Read-only to the core; nothing here is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}
