//! The ask flow: gate on processing state, retrieve, compose, generate.
//!
//! User-visible failure is always a bounded, polite message — a raw
//! generation error never escapes this module, and asking against a
//! document that is not ready reports "no content" instead of erroring.

use anyhow::Result;

use crate::compose::{self, Composition};
use crate::generate::APOLOGY;
use crate::models::{ConversationTurn, ProcessingState, RetrievalResult};
use crate::retrieve;
use crate::services::Services;

const STILL_PROCESSING_MESSAGE: &str =
    "That document is still being processed. Give it a moment and ask again.";
const PROCESSING_FAILED_MESSAGE: &str =
    "That document could not be processed, so there is no content to search.";
const NO_SUCH_DOCUMENT_MESSAGE: &str =
    "That document doesn't exist or has no searchable content.";

/// An answer with its supporting passages and aggregate confidence.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievalResult>,
    pub confidence: u8,
}

impl Answer {
    fn without_sources(text: &str) -> Self {
        Self {
            text: text.to_string(),
            sources: Vec::new(),
            confidence: 0,
        }
    }
}

/// Answer `question` from the user's indexed content, optionally scoped to
/// one document.
pub async fn ask(
    services: &Services,
    user_id: &str,
    question: &str,
    document_id: Option<&str>,
    history: &[ConversationTurn],
) -> Result<Answer> {
    // a document is never queryable until processing succeeded
    let document_label = match document_id {
        Some(id) => match services.store.get_document(id).await? {
            Some(doc) if doc.user_id == user_id => match doc.processed {
                ProcessingState::Succeeded => Some(doc.file_name),
                ProcessingState::Pending => {
                    return Ok(Answer::without_sources(STILL_PROCESSING_MESSAGE))
                }
                ProcessingState::Failed => {
                    return Ok(Answer::without_sources(PROCESSING_FAILED_MESSAGE))
                }
            },
            _ => return Ok(Answer::without_sources(NO_SUCH_DOCUMENT_MESSAGE)),
        },
        None => None,
    };

    let retrieved = retrieve::search(
        &services.embedder,
        &services.index,
        user_id,
        question,
        document_id,
        services.config.retrieval.top_k,
    )
    .await?;

    match compose::compose(
        question,
        &retrieved,
        history,
        document_label.as_deref(),
        &services.config.retrieval,
    ) {
        Composition::NoGrounding { message } => Ok(Answer {
            text: message,
            sources: retrieved,
            confidence: 0,
        }),
        Composition::Grounded(request) => {
            let text = match services.generator.generate(&request.prompt).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("generation failed: {e}");
                    APOLOGY.to_string()
                }
            };
            Ok(Answer {
                text,
                sources: retrieved,
                confidence: request.confidence,
            })
        }
    }
}
