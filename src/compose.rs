//! Context assembly for the generation step.
//!
//! Combines retrieved passages, recent conversation turns, and the user
//! query into one bounded prompt, and derives an aggregate confidence from
//! the passage similarities. With zero retrieved passages composition
//! short-circuits to a "no grounding" template so the generation service is
//! never invoked.

use crate::config::RetrievalConfig;
use crate::models::{ConversationTurn, RetrievalResult, Role};

/// Template answer when retrieval produced no grounding at all.
pub const NO_GROUNDING_MESSAGE: &str =
    "I couldn't find anything relevant to that question in the available documents. \
     Try rephrasing it, or upload a document that covers the topic.";

/// A composed request for the downstream generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Mean passage similarity scaled to 0–100.
    pub confidence: u8,
}

/// Outcome of composition: a prompt to generate from, or a short-circuit
/// answer when there is nothing to ground on.
#[derive(Debug, Clone)]
pub enum Composition {
    Grounded(GenerationRequest),
    NoGrounding { message: String },
}

/// Build the generation request for `query` over the retrieved passages
/// and recent history.
pub fn compose(
    query: &str,
    retrieved: &[RetrievalResult],
    history: &[ConversationTurn],
    document_label: Option<&str>,
    config: &RetrievalConfig,
) -> Composition {
    if retrieved.is_empty() {
        return Composition::NoGrounding {
            message: NO_GROUNDING_MESSAGE.to_string(),
        };
    }

    let label = document_label.unwrap_or("general knowledge");
    let history_turns = if document_label.is_some() {
        config.doc_history_turns
    } else {
        config.general_history_turns
    };

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "You are answering a question about {}.\n\n",
        label
    ));

    prompt.push_str("Context passages, most relevant first:\n");
    for (rank, passage) in retrieved.iter().enumerate() {
        prompt.push_str(&format!("[Source {}] {}\n", rank + 1, passage.text));
    }

    let recent = recent_history(history, history_turns);
    if !recent.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in recent {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, turn.text));
        }
    }

    prompt.push_str(&format!("\nQuestion: {}\n\n", query));
    prompt.push_str(
        "Answer concisely in your own words, grounded in the numbered sources. \
         Do not quote the sources verbatim, and say plainly when they do not \
         contain the answer.",
    );

    Composition::Grounded(GenerationRequest {
        prompt,
        confidence: confidence(retrieved),
    })
}

/// Aggregate confidence: mean passage similarity scaled to a 0–100
/// integer, 0 when nothing was retrieved.
pub fn confidence(retrieved: &[RetrievalResult]) -> u8 {
    if retrieved.is_empty() {
        return 0;
    }
    let mean = retrieved.iter().map(|r| r.score).sum::<f64>() / retrieved.len() as f64;
    (mean * 100.0).round().clamp(0.0, 100.0) as u8
}

fn recent_history(history: &[ConversationTurn], max_turns: usize) -> &[ConversationTurn] {
    let start = history.len().saturating_sub(max_turns);
    &history[start..]
}
