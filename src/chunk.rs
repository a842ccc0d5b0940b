//! Sentence-greedy text chunker.
//!
//! Splits cleaned document text into passages that respect a configurable
//! `max_chars` limit. Sentences accumulate greedily into a buffer; when the
//! next sentence would overflow, the passage closes and the next one is
//! seeded with the trailing words of the closed passage so neighbouring
//! passages share context.
//!
//! The overlap is word-granular: the seed is the last `overlap_chars / 10`
//! words of the closed passage, not the last `overlap_chars` characters.
//! Text without sentence boundaries falls back to fixed-width slicing with
//! character overlap, snapping slice ends to the nearest preceding space.
//!
//! The algorithm is deterministic: identical input and parameters always
//! produce identical passage boundaries.

/// Split text into passages bounded by `max_chars` with word-tail overlap.
///
/// Passages are trimmed and never empty. A single sentence longer than
/// `max_chars` is placed verbatim as its own oversized passage.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let cleaned = normalize_whitespace(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(&cleaned);
    let sentence_like = sentences
        .iter()
        .any(|s| s.ends_with(['.', '!', '?']));

    let passages = if sentence_like {
        merge_sentences(&sentences, max_chars, overlap_chars)
    } else {
        slice_fixed_width(&cleaned, max_chars, overlap_chars)
    };

    passages
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Collapse all whitespace runs (spaces, newlines, form feeds) to single
/// spaces. This is the "cleaned" text that passages reconstruct.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into sentence-like units on terminal punctuation.
/// The separating space is consumed; units carry their own punctuation.
fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut units = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        current.push(chars[i]);
        let at_boundary = matches!(chars[i], '.' | '!' | '?')
            && (i + 1 == chars.len() || chars[i + 1] == ' ');
        if at_boundary && !current.trim().is_empty() {
            units.push(std::mem::take(&mut current));
            // skip the separating space
            if i + 1 < chars.len() {
                i += 1;
            }
        }
        i += 1;
    }

    if !current.trim().is_empty() {
        units.push(current);
    }

    units
}

/// Greedily accumulate sentences into passages, seeding each new passage
/// with the word tail of the one just closed.
fn merge_sentences(sentences: &[String], max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let overlap_words = overlap_chars / 10;
    let mut passages = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        let needed = if current.is_empty() {
            sentence.len()
        } else {
            current.len() + 1 + sentence.len()
        };

        if needed > max_chars && !current.is_empty() {
            let seed = tail_words(&current, overlap_words);
            passages.push(std::mem::take(&mut current));
            // only carry the seed when it leaves room for the sentence,
            // otherwise the passage would overflow max_chars
            if !seed.is_empty() && seed.len() + 1 + sentence.len() <= max_chars {
                current = seed;
            }
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    if !current.is_empty() {
        passages.push(current);
    }

    passages
}

/// Last `n` whitespace-separated words of `text`, joined by single spaces.
fn tail_words(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    words[start..].join(" ")
}

/// Fixed-width slicing for degenerate text with no sentence boundaries.
/// Slice ends snap to the nearest preceding space when one exists.
fn slice_fixed_width(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut slices = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end < chars.len() {
            match chars[start..hard_end].iter().rposition(|c| *c == ' ') {
                Some(rel) if rel > 0 => start + rel,
                _ => hard_end,
            }
        } else {
            hard_end
        };

        slices.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        // overlap the next slice into the tail of this one, always advancing
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    slices
}
