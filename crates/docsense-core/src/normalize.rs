//! Text normalization and tokenization shared by chunks and queries.
//!
//! Chunks and queries go through the same two steps so that lexical
//! matching, categorization, and embeddings agree on what a "word" is:
//!
//! 1. [`normalize_text`] lowercases and collapses whitespace.
//! 2. [`tokenize`] splits normalized text into alphanumeric tokens.
//!
//! [`index_tokens`] additionally drops the fixed [`STOPWORDS`] set and is
//! what the inverted index and the lexical score operate on.

/// Stopwords excluded from the inverted index and lexical scoring.
///
/// Kept sorted so membership is a binary search.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "get", "had",
    "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not",
    "of", "on", "or", "our", "please", "should", "so", "some", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "to", "us", "was", "we", "were", "what",
    "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Lowercase `input` and collapse every whitespace run into a single space.
///
/// Leading and trailing whitespace is removed, so a whitespace-only input
/// normalizes to the empty string.
pub fn normalize_text(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.extend(ch.to_lowercase());
            last_space = false;
        }
    }
    if buf.ends_with(' ') {
        buf.pop();
    }
    buf
}

/// Split normalized text into alphanumeric tokens, in order.
///
/// Any non-alphanumeric character is a boundary, which is what makes
/// descriptor matching word-boundary aware: `"judge"` never matches inside
/// `"prejudged"`.
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns true for words in [`STOPWORDS`].
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Tokens of `normalized` with stopwords removed.
pub fn index_tokens(normalized: &str) -> Vec<String> {
    tokenize(normalized)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .collect()
}

/// Build the normalized search text for a structural path plus body.
///
/// Path titles come first so that headings contribute to lexical matches,
/// categorization, and embeddings.
pub fn search_text(path: &[String], normalized_body: &str) -> String {
    let mut out = String::new();
    for title in path {
        let t = normalize_text(title);
        if t.is_empty() {
            continue;
        }
        out.push_str(&t);
        out.push(' ');
    }
    out.push_str(normalized_body);
    normalize_text(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_are_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize_text("  Hello\n\n  WORLD\t! "), "hello world !");
        assert_eq!(normalize_text(" \n\t "), "");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn tokenize_respects_word_boundaries() {
        let tokens = tokenize("invite: add-judge (v2)");
        assert_eq!(tokens, vec!["invite", "add", "judge", "v2"]);
    }

    #[test]
    fn index_tokens_drop_stopwords() {
        let tokens = index_tokens(&normalize_text("How do I add a judge"));
        assert_eq!(tokens, vec!["add", "judge"]);
    }

    #[test]
    fn search_text_prefixes_path() {
        let path = vec!["Invite".to_string(), "Judges".to_string()];
        assert_eq!(search_text(&path, "add judge"), "invite judges add judge");
        assert_eq!(search_text(&[], "body only"), "body only");
    }

    #[test]
    fn unicode_lowercase() {
        assert_eq!(normalize_text("ÉTAPE Une"), "étape une");
        assert_eq!(tokenize("étape-une"), vec!["étape", "une"]);
    }
}
