//! Vector index abstraction with a durable-store fallback.
//!
//! The primary path talks to an external collection-style index service
//! over HTTP (Chroma-compatible API) and converts reported distances to
//! similarity via `1 - distance`. When the service is unconfigured or
//! unavailable at call time, queries are served from the SQLite chunk
//! store instead: chunks in the requested scope, truncated to `top_k`,
//! annotated with synthetic descending scores. Both paths return the same
//! hit shape, descending score order, and cardinality bound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::models::ServedBy;
use crate::store::ChunkStore;

/// Scope restriction for index operations. `document_id = None` covers all
/// of the user's indexed content.
#[derive(Debug, Clone)]
pub struct IndexFilter {
    pub user_id: String,
    pub document_id: Option<String>,
}

/// An entry to store in the index: one chunk with its vector and metadata.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub user_id: String,
    pub document_id: String,
    pub chunk_index: i64,
}

/// A ranked nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
    pub served_by: ServedBy,
}

/// Nearest-neighbour index over (vector, text, metadata) tuples.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), IndexError>;
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>, IndexError>;
    async fn delete_by_filter(&self, filter: &IndexFilter) -> Result<(), IndexError>;
}

// ============ HTTP index ============

/// Client for a Chroma-style collection API.
pub struct HttpVectorIndex {
    endpoint: String,
    collection: String,
    client: reqwest::Client,
}

impl HttpVectorIndex {
    pub fn new(endpoint: &str, config: &IndexConfig) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            client,
        })
    }

    fn url(&self, op: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.endpoint, self.collection, op
        )
    }

    fn where_clause(filter: &IndexFilter) -> serde_json::Value {
        match &filter.document_id {
            Some(doc_id) => serde_json::json!({ "document_id": doc_id }),
            None => serde_json::json!({ "user_id": filter.user_id }),
        }
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, IndexError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::Unavailable(format!("{}: {}", status, text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::Rejected(format!("{}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| IndexError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        let body = serde_json::json!({
            "ids": entries.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            "embeddings": entries.iter().map(|e| &e.vector).collect::<Vec<_>>(),
            "documents": entries.iter().map(|e| e.text.as_str()).collect::<Vec<_>>(),
            "metadatas": entries
                .iter()
                .map(|e| serde_json::json!({
                    "user_id": e.user_id,
                    "document_id": e.document_id,
                    "chunk_index": e.chunk_index,
                }))
                .collect::<Vec<_>>(),
        });

        self.post(&self.url("upsert"), &body).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let body = serde_json::json!({
            "query_embeddings": [vector],
            "n_results": top_k,
            "where": Self::where_clause(filter),
            "include": ["documents", "metadatas", "distances"],
        });

        let json = self.post(&self.url("query"), &body).await?;
        parse_query_response(&json, top_k)
    }

    async fn delete_by_filter(&self, filter: &IndexFilter) -> Result<(), IndexError> {
        let body = serde_json::json!({ "where": Self::where_clause(filter) });
        self.post(&self.url("delete"), &body).await?;
        Ok(())
    }
}

/// Parse a Chroma query response: parallel arrays nested one level per
/// query vector. Distance converts to similarity via `1 - d`, clamped to
/// [0, 1].
fn parse_query_response(json: &serde_json::Value, top_k: usize) -> Result<Vec<IndexHit>, IndexError> {
    fn first<'a>(
        json: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a Vec<serde_json::Value>> {
        json.get(key)?.as_array()?.first()?.as_array()
    }

    let documents = first(json, "documents")
        .ok_or_else(|| IndexError::Rejected("missing documents array".to_string()))?;
    let metadatas = first(json, "metadatas")
        .ok_or_else(|| IndexError::Rejected("missing metadatas array".to_string()))?;
    let distances = first(json, "distances")
        .ok_or_else(|| IndexError::Rejected("missing distances array".to_string()))?;

    let mut hits = Vec::new();

    for ((doc, meta), dist) in documents.iter().zip(metadatas).zip(distances) {
        let text = doc.as_str().unwrap_or_default().to_string();
        let distance = dist.as_f64().unwrap_or(1.0);
        let score = (1.0 - distance).clamp(0.0, 1.0);
        let document_id = meta
            .get("document_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let chunk_index = meta.get("chunk_index").and_then(|v| v.as_i64()).unwrap_or(0);

        hits.push(IndexHit {
            document_id,
            chunk_index,
            text,
            score,
            served_by: ServedBy::Primary,
        });
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_k);

    Ok(hits)
}

// ============ Fallback scoring ============

/// Synthetic similarity for fallback hits: 0.8 at rank 0, minus 0.1 per
/// rank, floored at 0.1. Monotonically non-increasing.
pub fn fallback_score(rank: usize) -> f64 {
    (0.8 - 0.1 * rank as f64).max(0.1)
}

// ============ Service ============

/// Index strategy resolver: the external service first, the durable chunk
/// store when the service is unconfigured or unavailable at call time.
///
/// A transport-level failure latches `available` so later calls skip the
/// dead endpoint; a rejection falls back for that call only.
pub struct IndexService {
    primary: Option<Box<dyn VectorIndex>>,
    available: AtomicBool,
    store: ChunkStore,
}

impl IndexService {
    pub fn new(config: &IndexConfig, store: ChunkStore) -> Self {
        let primary: Option<Box<dyn VectorIndex>> = match &config.endpoint {
            Some(endpoint) => match HttpVectorIndex::new(endpoint, config) {
                Ok(index) => Some(Box::new(index)),
                Err(e) => {
                    tracing::warn!("vector index init failed, using store fallback: {e}");
                    None
                }
            },
            None => None,
        };

        Self {
            primary,
            available: AtomicBool::new(true),
            store,
        }
    }

    /// Service with no external index; every call uses the store fallback.
    pub fn fallback_only(store: ChunkStore) -> Self {
        Self {
            primary: None,
            available: AtomicBool::new(true),
            store,
        }
    }

    /// Service over a caller-supplied index (used by tests).
    pub fn with_index(primary: Box<dyn VectorIndex>, store: ChunkStore) -> Self {
        Self {
            primary: Some(primary),
            available: AtomicBool::new(true),
            store,
        }
    }

    fn primary_if_available(&self) -> Option<&dyn VectorIndex> {
        if !self.available.load(Ordering::Relaxed) {
            return None;
        }
        self.primary.as_deref()
    }

    fn record_error(&self, e: &IndexError) {
        if matches!(e, IndexError::Unavailable(_)) {
            self.available.store(false, Ordering::Relaxed);
        }
    }

    /// Store entries in the external index. An error means the entries are
    /// not indexed — the caller records NULL index refs and the chunks
    /// remain reachable through the store fallback.
    pub async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        match self.primary_if_available() {
            Some(index) => {
                let result = index.upsert(entries).await;
                if let Err(e) = &result {
                    self.record_error(e);
                }
                result
            }
            None => Err(IndexError::Unavailable(
                "vector index not configured or unavailable".to_string(),
            )),
        }
    }

    /// Nearest-neighbour query. Never fails: an unavailable or erroring
    /// primary is substituted by the durable-store scan with synthetic
    /// descending scores.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>> {
        if let Some(index) = self.primary_if_available() {
            match index.query(vector, top_k, filter).await {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    self.record_error(&e);
                    tracing::warn!("vector index query failed, using store fallback: {e}");
                }
            }
        }

        let chunks = self
            .store
            .chunks_for_scope(&filter.user_id, filter.document_id.as_deref(), top_k)
            .await?;

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(rank, chunk)| IndexHit {
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                score: fallback_score(rank),
                served_by: ServedBy::Fallback,
            })
            .collect())
    }

    /// Best-effort removal of a document's index entries; failures are
    /// logged, the store cascade is authoritative.
    pub async fn delete_document(&self, filter: &IndexFilter) {
        if let Some(index) = self.primary_if_available() {
            if let Err(e) = index.delete_by_filter(filter).await {
                self.record_error(&e);
                tracing::warn!("vector index delete failed: {e}");
            }
        }
    }
}
