//! Immutable snapshot indexer.
//!
//! [`build_snapshot`] turns an ordered chunk sequence into a [`Snapshot`]:
//! one unit-length embedding per chunk, a stopword-free inverted index,
//! category and id lookups, and a content digest over `(id, hash, source_url)`
//! triples.
//!
//! A snapshot is never mutated after construction. Building is all or
//! nothing: any embedding failure aborts without a partial result.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::embedding::{l2_normalize, EmbedError, Embedder};
use crate::models::Chunk;
use crate::normalize::index_tokens;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),
    #[error("chunk {chunk_id} embedded to {actual} dimensions, model reports {expected}")]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },
}

/// Counters describing a single build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub chunks: usize,
    pub duplicates: usize,
    pub tokens: usize,
}

#[derive(Debug)]
pub struct Snapshot {
    version: u64,
    created_at: DateTime<Utc>,
    model: String,
    dims: usize,
    digest: String,
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    postings: HashMap<String, Vec<usize>>,
    by_category: BTreeMap<String, Vec<usize>>,
    by_id: HashMap<String, usize>,
    stats: BuildStats,
}

impl Snapshot {
    /// The version-0 bootstrap snapshot served before the first refresh.
    pub fn empty() -> Self {
        Self {
            version: 0,
            created_at: Utc::now(),
            model: String::new(),
            dims: 0,
            digest: digest_of(&[]),
            chunks: Vec::new(),
            embeddings: Vec::new(),
            postings: HashMap::new(),
            by_category: BTreeMap::new(),
            by_id: HashMap::new(),
            stats: BuildStats::default(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// SHA-256 over the ordered `(id, hash, source_url)` triples of all chunks.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn build_stats(&self) -> BuildStats {
        self.stats
    }

    pub fn chunk(&self, ordinal: usize) -> Option<&Chunk> {
        self.chunks.get(ordinal)
    }

    pub fn embedding(&self, ordinal: usize) -> Option<&[f32]> {
        self.embeddings.get(ordinal).map(Vec::as_slice)
    }

    pub fn ordinal_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.ordinal_of(id).and_then(|i| self.chunks.get(i))
    }

    /// Ascending chunk ordinals containing `token`.
    pub fn postings(&self, token: &str) -> &[usize] {
        self.postings.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ascending chunk ordinals carrying `category`.
    pub fn in_category(&self, category: &str) -> &[usize] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Chunk counts per category, sorted by name.
    pub fn category_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.by_category.iter().map(|(k, v)| (k.as_str(), v.len()))
    }
}

/// Build an immutable snapshot from categorized chunks.
///
/// Chunks keep their input order, minus duplicate ids (only the first
/// occurrence is kept). Embeddings are computed over each chunk's search
/// text and normalized to unit length.
pub fn build_snapshot(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    version: u64,
) -> Result<Snapshot, IndexError> {
    let mut seen: HashSet<String> = HashSet::with_capacity(chunks.len());
    let mut duplicates = 0usize;
    let chunks: Vec<Chunk> = chunks
        .into_iter()
        .filter(|c| {
            if seen.insert(c.id.clone()) {
                true
            } else {
                duplicates += 1;
                false
            }
        })
        .collect();

    let texts: Vec<String> = chunks.iter().map(Chunk::search_text).collect();
    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        embedder.embed_batch(&texts)?
    };
    if embeddings.len() != chunks.len() {
        return Err(EmbedError::BatchSize {
            expected: chunks.len(),
            actual: embeddings.len(),
        }
        .into());
    }

    let dims = embedder.dims();
    let mut normalized = Vec::with_capacity(embeddings.len());
    for (chunk, mut vec) in chunks.iter().zip(embeddings) {
        if vec.len() != dims {
            return Err(IndexError::DimensionMismatch {
                chunk_id: chunk.id.clone(),
                expected: dims,
                actual: vec.len(),
            });
        }
        l2_normalize(&mut vec);
        normalized.push(vec);
    }

    let mut postings: HashMap<String, Vec<usize>> = HashMap::new();
    let mut by_category: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut by_id: HashMap<String, usize> = HashMap::with_capacity(chunks.len());

    for (ordinal, (chunk, text)) in chunks.iter().zip(&texts).enumerate() {
        let mut tokens = index_tokens(text);
        tokens.sort_unstable();
        tokens.dedup();
        for token in tokens {
            postings.entry(token).or_default().push(ordinal);
        }
        for category in &chunk.categories {
            by_category.entry(category.clone()).or_default().push(ordinal);
        }
        by_id.insert(chunk.id.clone(), ordinal);
    }

    let stats = BuildStats {
        chunks: chunks.len(),
        duplicates,
        tokens: postings.len(),
    };

    Ok(Snapshot {
        version,
        created_at: Utc::now(),
        model: embedder.model_name().to_string(),
        dims,
        digest: digest_of(&chunks),
        chunks,
        embeddings: normalized,
        postings,
        by_category,
        by_id,
        stats,
    })
}

fn digest_of(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.as_bytes());
        hasher.update([0]);
        hasher.update(chunk.hash.as_bytes());
        hasher.update([0]);
        // A page that moved keeps its ids but must still republish.
        hasher.update(chunk.source_url.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    struct Broken;

    impl Embedder for Broken {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            4
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Provider("offline".into()))
        }
    }

    struct WrongDims;

    impl Embedder for WrongDims {
        fn model_name(&self) -> &str {
            "wrong"
        }
        fn dims(&self) -> usize {
            8
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![1.0; 3])
        }
    }

    fn sample() -> Vec<Chunk> {
        vec![
            Chunk::new(vec!["Setup".into()], 0, "Connect wallet").with_categories(["setup"]),
            Chunk::new(vec!["Judging".into()], 0, "Scoring rubric")
                .with_categories(["judging"]),
            Chunk::new(vec!["Invite".into()], 0, "Add judge").with_categories(["invite"]),
        ]
    }

    #[test]
    fn identical_input_gives_identical_digest() {
        let e = HashEmbedder::new(64);
        let a = build_snapshot(sample(), &e, 1).unwrap();
        let b = build_snapshot(sample(), &e, 2).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.chunks(), b.chunks());
        assert_eq!(a.embedding(0), b.embedding(0));
    }

    #[test]
    fn digest_changes_with_content() {
        let e = HashEmbedder::new(64);
        let a = build_snapshot(sample(), &e, 1).unwrap();
        let mut edited = sample();
        edited[2] = Chunk::new(vec!["Invite".into()], 0, "Add a judge");
        let b = build_snapshot(edited, &e, 2).unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_changes_when_page_moves() {
        let e = HashEmbedder::new(64);
        let at = |url: &str| {
            let chunks = sample().into_iter().map(|c| c.with_source_url(url)).collect();
            build_snapshot(chunks, &e, 1).unwrap()
        };
        let old = at("https://docs.example.com/guide/invite");
        let moved = at("https://docs.example.com/help/invite");
        assert_eq!(old.chunks()[0].id, moved.chunks()[0].id);
        assert_ne!(old.digest(), moved.digest());
    }

    #[test]
    fn empty_snapshot_matches_empty_build() {
        let e = HashEmbedder::new(8);
        let built = build_snapshot(Vec::new(), &e, 1).unwrap();
        let empty = Snapshot::empty();
        assert_eq!(built.digest(), empty.digest());
        assert_eq!(empty.version(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn postings_skip_stopwords_and_are_ascending() {
        let e = HashEmbedder::new(32);
        let snap = build_snapshot(sample(), &e, 1).unwrap();
        assert_eq!(snap.postings("judge"), &[2]);
        assert_eq!(snap.postings("judging"), &[1]);
        assert!(snap.postings("the").is_empty());
        assert_eq!(snap.in_category("invite"), &[2]);
        assert!(snap.in_category("billing").is_empty());
    }

    #[test]
    fn duplicates_collapse_to_first() {
        let e = HashEmbedder::new(32);
        let mut chunks = sample();
        chunks.push(
            Chunk::new(vec!["Setup".into()], 0, "Connect wallet")
                .with_source_url("https://docs.example.com/other"),
        );
        let snap = build_snapshot(chunks, &e, 1).unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.build_stats().duplicates, 1);
        assert_eq!(snap.ordinal_of(&snap.chunks()[0].id), Some(0));
        assert!(snap.chunks()[0].source_url.is_none());
    }

    #[test]
    fn embeddings_are_unit_length() {
        let e = HashEmbedder::new(32);
        let snap = build_snapshot(sample(), &e, 1).unwrap();
        for i in 0..snap.len() {
            let v = snap.embedding(i).unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
        assert_eq!(snap.dims(), 32);
        assert_eq!(snap.model(), HashEmbedder::MODEL);
    }

    #[test]
    fn failures_are_atomic() {
        assert!(matches!(
            build_snapshot(sample(), &Broken, 1),
            Err(IndexError::Embedding(_))
        ));
        assert!(matches!(
            build_snapshot(sample(), &WrongDims, 1),
            Err(IndexError::DimensionMismatch { expected: 8, actual: 3, .. })
        ));
    }
}
