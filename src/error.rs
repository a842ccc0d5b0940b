//! Error taxonomy for the pipeline stages.
//!
//! Only [`ExtractionError`] aborts a document's ingestion. Embedding and
//! index unavailability never escape their stage — the local fallbacks
//! substitute — and [`GenerationError`] is never surfaced raw to the user.

/// Fatal per-document extraction failure.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("document is password-protected")]
    PasswordProtected,

    #[error("unsupported media type: {0}")]
    UnsupportedType(String),

    /// Raised when the text layer and the OCR fallback together yielded
    /// less usable text than the configured minimum.
    #[error("insufficient extractable text ({got} chars, need at least {min})")]
    InsufficientText { got: usize, min: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the primary embedding backend. Handled inside the embedding
/// service by substituting the deterministic local fallback.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Transport-level failure (connection refused, timeout, retries
    /// exhausted). Latches the service's unavailability flag.
    #[error("embedding service unreachable: {0}")]
    Unavailable(String),

    /// The service answered but rejected the request.
    #[error("embedding request rejected: {0}")]
    Rejected(String),
}

/// Failure of the external vector index. Handled by the index service by
/// falling back to a durable-store scan.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector index unreachable: {0}")]
    Unavailable(String),

    #[error("vector index rejected the request: {0}")]
    Rejected(String),
}

/// Failure of the downstream generation service. Callers substitute a
/// scripted apology; the original error is only logged.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation returned an empty response")]
    EmptyResponse,
}
