//! Query-time retrieval: embed the query, search the index, return ranked
//! passages.

use anyhow::Result;

use crate::embedding::EmbeddingService;
use crate::index::{IndexFilter, IndexService};
use crate::models::RetrievalResult;

/// Retrieve the passages most relevant to `query`, at most `top_k`, sorted
/// by descending similarity.
///
/// `document_scope = None` searches all of the user's indexed content; a
/// present scope restricts to that document. Ownership of the scope is the
/// caller's responsibility. Zero hits return an empty vec — insufficient
/// grounding, not an error.
pub async fn search(
    embedder: &EmbeddingService,
    index: &IndexService,
    user_id: &str,
    query: &str,
    document_scope: Option<&str>,
    top_k: usize,
) -> Result<Vec<RetrievalResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let embedded = embedder.embed(query).await;

    let filter = IndexFilter {
        user_id: user_id.to_string(),
        document_id: document_scope.map(|s| s.to_string()),
    };

    let hits = index.query(&embedded.vector, top_k, &filter).await?;

    Ok(hits
        .into_iter()
        .map(|hit| RetrievalResult {
            document_id: hit.document_id,
            chunk_index: hit.chunk_index,
            text: hit.text,
            score: hit.score,
            served_by: hit.served_by,
        })
        .collect())
}
