//! Paragraph-boundary section chunker.
//!
//! Splits the text of one documentation section into [`Chunk`]s that respect
//! a configurable `max_tokens` limit. Splitting occurs on paragraph
//! boundaries (`\n\n`) to keep related sentences together.
//!
//! Every piece shares the section's structural path and receives a `part`
//! index, so the chunk id stays a pure function of path, part and content.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split text on `\n\n` paragraph boundaries.
//! 3. Accumulate paragraphs into a buffer until adding the next paragraph
//!    would exceed `max_chars`.
//! 4. When exceeded, flush the buffer as a chunk and start a new one.
//! 5. If a single paragraph exceeds `max_chars`, hard-split it at the
//!    nearest newline or space boundary.
//! 6. Whitespace-only sections produce no chunks.
//!
//! # Example
//!
//! ```rust
//! use docsense_core::chunk::chunk_section;
//!
//! let path = vec!["Setup".to_string()];
//! let chunks = chunk_section(&path, "Connect wallet.\n\nPick a network.", 300);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].part, 0);
//! ```

use crate::models::Chunk;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split a section's text into chunks on paragraph boundaries.
///
/// Returned chunks carry contiguous `part` indices starting at 0 and no
/// categories. An empty or whitespace-only `text` yields no chunks.
pub fn chunk_section(path: &[String], text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces: Vec<String> = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk::new(path.to_vec(), i as u32, piece))
        .collect()
}

/// Split an oversized paragraph at newline/space boundaries.
fn hard_split(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Vec<String> {
        vec!["Guide".to_string(), "Judging".to_string()]
    }

    #[test]
    fn small_section_single_chunk() {
        let chunks = chunk_section(&path(), "Scores are averaged.", 300);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].part, 0);
        assert_eq!(chunks[0].text, "Scores are averaged.");
        assert_eq!(chunks[0].path, path());
    }

    #[test]
    fn empty_section_has_no_chunks() {
        assert!(chunk_section(&path(), "", 300).is_empty());
        assert!(chunk_section(&path(), " \n\n \n\n", 300).is_empty());
    }

    #[test]
    fn paragraphs_exceeding_limit_split() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_section(&path(), text, 8);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.part, i as u32);
        }
    }

    #[test]
    fn oversized_paragraph_hard_splits_on_spaces() {
        let text = "word ".repeat(100);
        let chunks = chunk_section(&path(), &text, 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 20, "piece too long: {:?}", c.text);
            assert!(!c.text.starts_with(' '));
        }
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_section(&path(), text, 2);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn ids_are_unique_across_parts_and_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let first = chunk_section(&path(), text, 1);
        let second = chunk_section(&path(), text, 1);
        assert_eq!(first, second);
        let mut ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), first.len());
    }
}
