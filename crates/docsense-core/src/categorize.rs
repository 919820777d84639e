//! Two-stage chunk categorization against a fixed taxonomy.
//!
//! 1. **Lexical.** A category matches when one of its descriptors appears
//!    as a contiguous token run in the chunk's search text. Matching is
//!    case-insensitive and word-boundary aware, so `"judge"` matches
//!    `"Add a Judge"` but not `"prejudged"`.
//! 2. **Semantic fallback.** Only when stage 1 matched nothing, the chunk's
//!    embedding is compared against each category's descriptor embedding;
//!    every category with cosine similarity above the threshold is assigned.
//!
//! An empty result is valid and means "uncategorized".

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::{cosine_similarity, EmbedError, Embedder};
use crate::models::{Chunk, Taxonomy};
use crate::normalize::{normalize_text, tokenize};

/// Default similarity threshold for the semantic fallback stage.
pub const DEFAULT_CATEGORY_THRESHOLD: f32 = 0.35;

struct CompiledCategory {
    name: String,
    descriptors: Vec<Vec<String>>,
    embedding: Vec<f32>,
}

pub struct Categorizer {
    categories: Vec<CompiledCategory>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
}

impl Categorizer {
    /// Compile the taxonomy: tokenize descriptors and embed each category's
    /// descriptor text once.
    pub fn new(
        taxonomy: &Taxonomy,
        embedder: Arc<dyn Embedder>,
        threshold: f32,
    ) -> Result<Self, EmbedError> {
        let texts: Vec<String> = taxonomy
            .categories()
            .iter()
            .map(|c| normalize_text(&c.descriptors.join(" ")))
            .collect();
        let embeddings = embedder.embed_batch(&texts)?;
        if embeddings.len() != texts.len() {
            return Err(EmbedError::BatchSize {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }

        let categories = taxonomy
            .categories()
            .iter()
            .zip(embeddings)
            .map(|(c, embedding)| CompiledCategory {
                name: c.name.clone(),
                descriptors: c
                    .descriptors
                    .iter()
                    .map(|d| tokenize(&normalize_text(d)))
                    .filter(|tokens| !tokens.is_empty())
                    .collect(),
                embedding,
            })
            .collect();

        Ok(Self {
            categories,
            embedder,
            threshold,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Assign categories to a single chunk.
    pub fn categorize(&self, chunk: &Chunk) -> Result<BTreeSet<String>, EmbedError> {
        let text = chunk.search_text();
        let lexical = self.lexical_matches(&text);
        if !lexical.is_empty() {
            return Ok(lexical);
        }
        let vector = self.embedder.embed(&text)?;
        Ok(self.semantic_matches(&vector))
    }

    /// Categorize a batch of chunks, embedding only those that need the
    /// semantic fallback. Returned chunks carry their assigned categories.
    pub fn categorize_all(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, EmbedError> {
        let mut chunks = chunks;
        let mut pending: Vec<usize> = Vec::new();
        let mut texts: Vec<String> = Vec::new();

        for (i, chunk) in chunks.iter_mut().enumerate() {
            let text = chunk.search_text();
            let lexical = self.lexical_matches(&text);
            if lexical.is_empty() {
                pending.push(i);
                texts.push(text);
            } else {
                chunk.categories = lexical;
            }
        }

        if pending.is_empty() || self.categories.is_empty() {
            return Ok(chunks);
        }

        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::BatchSize {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        for (i, vector) in pending.into_iter().zip(vectors) {
            chunks[i].categories = self.semantic_matches(&vector);
        }
        Ok(chunks)
    }

    fn lexical_matches(&self, search_text: &str) -> BTreeSet<String> {
        let tokens = tokenize(search_text);
        self.categories
            .iter()
            .filter(|c| {
                c.descriptors
                    .iter()
                    .any(|d| contains_sequence(&tokens, d))
            })
            .map(|c| c.name.clone())
            .collect()
    }

    fn semantic_matches(&self, vector: &[f32]) -> BTreeSet<String> {
        self.categories
            .iter()
            .filter(|c| cosine_similarity(vector, &c.embedding) > self.threshold)
            .map(|c| c.name.clone())
            .collect()
    }
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::Category;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(vec![
            Category::new("Judging", ["judge", "judging", "scoring rubric"]),
            Category::new("Setup", ["setup", "connect wallet"]),
            Category::new("Invite", ["invite", "add judge"]),
        ])
    }

    fn categorizer(threshold: f32) -> Categorizer {
        Categorizer::new(&taxonomy(), Arc::new(HashEmbedder::default()), threshold).unwrap()
    }

    fn chunk(path: &str, text: &str) -> Chunk {
        Chunk::new(vec![path.to_string()], 0, text)
    }

    #[test]
    fn lexical_phrase_match_is_word_aware() {
        let c = categorizer(DEFAULT_CATEGORY_THRESHOLD);
        let got = c
            .categorize(&chunk("Guide", "First, Connect  Wallet from the menu."))
            .unwrap();
        assert_eq!(got, BTreeSet::from(["setup".to_string()]));

        let got = c.categorize(&chunk("Notes", "This was prejudged.")).unwrap();
        assert!(!got.contains("judging"));
    }

    #[test]
    fn multiple_categories_can_match() {
        let c = categorizer(DEFAULT_CATEGORY_THRESHOLD);
        let got = c
            .categorize(&chunk("Invite", "Add judge before judging starts."))
            .unwrap();
        assert_eq!(
            got,
            BTreeSet::from(["invite".to_string(), "judging".to_string()])
        );
    }

    #[test]
    fn path_titles_contribute_to_matches() {
        let c = categorizer(DEFAULT_CATEGORY_THRESHOLD);
        let got = c.categorize(&chunk("Setup", "Pick a network.")).unwrap();
        assert!(got.contains("setup"));
    }

    #[test]
    fn semantic_fallback_respects_threshold() {
        // Threshold above any cosine keeps the chunk uncategorized.
        let strict = categorizer(1.0);
        let got = strict
            .categorize(&chunk("Misc", "Weather forecast for tomorrow."))
            .unwrap();
        assert!(got.is_empty());

        // A negative threshold assigns every category with a non-opposite vector.
        let loose = categorizer(-1.0);
        let got = loose
            .categorize(&chunk("Misc", "judges judged judgement"))
            .unwrap();
        assert!(!got.is_empty());
    }

    #[test]
    fn categorize_all_matches_single_calls() {
        let c = categorizer(DEFAULT_CATEGORY_THRESHOLD);
        let chunks = vec![
            chunk("Setup", "connect wallet"),
            chunk("Judging", "scoring rubric"),
            chunk("Misc", "unrelated words here"),
        ];
        let expected: Vec<BTreeSet<String>> =
            chunks.iter().map(|ch| c.categorize(ch).unwrap()).collect();
        let got: Vec<BTreeSet<String>> = c
            .categorize_all(chunks)
            .unwrap()
            .into_iter()
            .map(|ch| ch.categories)
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn contains_sequence_edges() {
        let hay: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert!(contains_sequence(&hay, &hay[1..]));
        assert!(!contains_sequence(&hay, &[]));
        assert!(!contains_sequence(&hay[..1], &hay));
    }
}
