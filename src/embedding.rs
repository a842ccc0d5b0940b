//! Embedding provider abstraction with a deterministic local fallback.
//!
//! The primary backend is an OpenAI-compatible HTTP endpoint (retry with
//! exponential backoff on 429/5xx and network errors, fail fast on other
//! 4xx). [`EmbeddingService::embed`] never fails outwardly: any primary
//! error or timeout substitutes the local hash embedding instead of
//! propagating.
//!
//! # Fallback algorithm
//!
//! Lower-case the text and split on whitespace. For the word at position
//! `i`, hash it, map the hash modulo 384 to a slot, and add `1/(i+1)` to
//! that slot — earlier words carry more weight on purpose. L2-normalize the
//! result unless it is all-zero. The fallback is a pure function of the
//! text alone, so identical text always yields a bit-identical vector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::models::ServedBy;

/// Dimensionality of the local fallback embedding space.
pub const FALLBACK_DIMS: usize = 384;

/// A primary embedding backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality of this backend.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// A query or chunk embedding together with the strategy that produced it.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub served_by: ServedBy,
}

// ============ HTTP backend ============

/// Embedding backend for an OpenAI-compatible `/embeddings` endpoint.
///
/// Reads `OPENAI_API_KEY` from the environment when present; requests
/// without a key are sent unauthenticated (local deployments).
pub struct HttpEmbeddingBackend {
    endpoint: String,
    model: String,
    dims: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbeddingBackend {
    pub fn new(endpoint: &str, config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbeddingError::Rejected(e.to_string()))?;
                        return parse_embeddings_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbeddingError::Unavailable(format!(
                            "{}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbeddingError::Rejected(format!(
                        "{}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbeddingError::Unavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbeddingError::Unavailable("retries exhausted".to_string())))
    }
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::Rejected("missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbeddingError::Rejected("missing embedding".to_string()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Local fallback ============

/// Deterministic local embedding: hashed bag of words with position decay.
pub fn fallback_embedding(text: &str) -> Vec<f32> {
    let mut acc = vec![0.0f32; FALLBACK_DIMS];

    for (i, word) in text.to_lowercase().split_whitespace().enumerate() {
        let slot = (word_hash(word) % FALLBACK_DIMS as u64) as usize;
        acc[slot] += 1.0 / (i as f32 + 1.0);
    }

    let norm = acc.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut acc {
            *v /= norm;
        }
    }

    acc
}

/// Stable per-word hash: first 8 bytes of sha256, big-endian.
fn word_hash(word: &str) -> u64 {
    let digest = Sha256::digest(word.as_bytes());
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

// ============ Service ============

/// Embedding strategy resolver: primary backend first, local fallback when
/// the primary is absent, unavailable, or errors at call time.
///
/// A transport-level failure latches `available` so later calls skip
/// straight to the fallback instead of re-dialing a dead endpoint. A
/// rejection (4xx) falls back for that call only.
pub struct EmbeddingService {
    backend: Option<Box<dyn EmbeddingBackend>>,
    available: AtomicBool,
}

impl EmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let backend: Option<Box<dyn EmbeddingBackend>> = match &config.endpoint {
            Some(endpoint) => match HttpEmbeddingBackend::new(endpoint, config) {
                Ok(b) => Some(Box::new(b)),
                Err(e) => {
                    tracing::warn!("embedding backend init failed, using fallback: {e}");
                    None
                }
            },
            None => None,
        };

        Self {
            backend,
            available: AtomicBool::new(true),
        }
    }

    /// Service with no primary backend; every call uses the fallback.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            available: AtomicBool::new(true),
        }
    }

    /// Service over a caller-supplied backend (used by tests).
    pub fn with_backend(backend: Box<dyn EmbeddingBackend>) -> Self {
        Self {
            backend: Some(backend),
            available: AtomicBool::new(true),
        }
    }

    /// Embed one text. Never fails.
    pub async fn embed(&self, text: &str) -> Embedded {
        let (mut vectors, served_by) = self.embed_batch(&[text.to_string()]).await;
        match vectors.pop() {
            Some(vector) => Embedded { vector, served_by },
            None => Embedded {
                vector: fallback_embedding(text),
                served_by: ServedBy::Fallback,
            },
        }
    }

    /// Embed a batch with a single strategy for the whole batch, so every
    /// vector of one document shares a dimensionality. Never fails.
    pub async fn embed_batch(&self, texts: &[String]) -> (Vec<Vec<f32>>, ServedBy) {
        if let Some(backend) = &self.backend {
            if self.available.load(Ordering::Relaxed) {
                match backend.embed(texts).await {
                    Ok(vectors) if vectors.len() == texts.len() => {
                        return (vectors, ServedBy::Primary);
                    }
                    Ok(vectors) => {
                        tracing::warn!(
                            expected = texts.len(),
                            got = vectors.len(),
                            "embedding backend returned wrong cardinality, using fallback"
                        );
                    }
                    Err(e) => {
                        if matches!(e, EmbeddingError::Unavailable(_)) {
                            self.available.store(false, Ordering::Relaxed);
                        }
                        tracing::warn!("embedding backend failed, using fallback: {e}");
                    }
                }
            }
        }

        let vectors = texts.iter().map(|t| fallback_embedding(t)).collect();
        (vectors, ServedBy::Fallback)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
