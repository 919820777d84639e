//! Hybrid semantic + lexical retrieval over the current snapshot.
//!
//! The engine never mutates anything: it captures the current
//! [`Snapshot`](crate::index::Snapshot) once per query and scores every
//! candidate against that single version.
//!
//! # Scoring
//!
//! 1. Normalize the query like chunk text; empty is an error.
//! 2. Candidates are all chunks, or the chunks carrying the filter category.
//! 3. `semantic` = dot product of the unit query vector with each unit chunk
//!    vector, clamped at 0. If the query cannot be embedded, semantic is 0
//!    everywhere and the result is flagged `semantic_degraded`.
//! 4. `lexical` = fraction of distinct non-stopword query tokens present in
//!    the chunk's search text.
//! 5. `score = (ws × semantic + wl × lexical) / (ws + wl)`.
//! 6. Drop candidates with `score <= min_relevance`.
//! 7. Sort by score (desc), path (asc), part (asc), snapshot order.
//! 8. Truncate to `k`.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::embedding::{dot, l2_normalize, Embedder};
use crate::index::Snapshot;
use crate::models::{Hit, QueryOutcome, QueryResult, Taxonomy};
use crate::normalize::{index_tokens, normalize_text};
use crate::snapshot::SnapshotReader;
use crate::stats::{NoopStats, QueryObservation, StatsSink};

/// Characters of chunk text carried in [`Hit::snippet`].
const SNIPPET_CHARS: usize = 280;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query is empty after normalization")]
    InvalidQuery,
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Weight of the semantic component.
    pub semantic_weight: f64,
    /// Weight of the lexical component.
    pub lexical_weight: f64,
    /// Hits must score strictly above this floor.
    pub min_relevance: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            semantic_weight: 0.75,
            lexical_weight: 0.25,
            min_relevance: 0.2,
        }
    }
}

impl RetrievalParams {
    fn combine(&self, semantic: f64, lexical: f64) -> f64 {
        let total = self.semantic_weight + self.lexical_weight;
        if total <= 0.0 {
            return 0.0;
        }
        (self.semantic_weight * semantic + self.lexical_weight * lexical) / total
    }
}

pub struct RetrievalEngine {
    reader: SnapshotReader,
    taxonomy: Taxonomy,
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
    stats: Arc<dyn StatsSink>,
}

impl RetrievalEngine {
    pub fn new(
        reader: SnapshotReader,
        taxonomy: Taxonomy,
        embedder: Arc<dyn Embedder>,
        params: RetrievalParams,
    ) -> Self {
        Self {
            reader,
            taxonomy,
            embedder,
            params,
            stats: Arc::new(NoopStats),
        }
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn params(&self) -> RetrievalParams {
        self.params
    }

    /// Rank chunks of the current snapshot against `text`.
    pub fn query(
        &self,
        text: &str,
        category: Option<&str>,
        k: usize,
    ) -> Result<QueryResult, QueryError> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(QueryError::InvalidQuery);
        }
        let filter = match category {
            Some(name) => Some(
                self.taxonomy
                    .resolve(name)
                    .ok_or_else(|| QueryError::UnknownCategory(name.to_string()))?
                    .to_string(),
            ),
            None => None,
        };

        let snapshot = self.reader.load();
        let result = self.rank(&snapshot, &normalized, filter.as_deref(), k);

        let mut matched: Vec<String> = result
            .hits
            .iter()
            .filter_map(|h| h.matched_category.clone())
            .collect();
        matched.sort();
        matched.dedup();
        self.stats.record(&QueryObservation {
            query_len: normalized.chars().count(),
            matched_categories: matched,
            result_count: result.hits.len(),
        });

        Ok(result)
    }

    fn rank(
        &self,
        snapshot: &Snapshot,
        normalized: &str,
        filter: Option<&str>,
        k: usize,
    ) -> QueryResult {
        let candidates: Vec<usize> = match filter {
            Some(name) => snapshot.in_category(name).to_vec(),
            None => (0..snapshot.len()).collect(),
        };
        if candidates.is_empty() {
            return QueryResult {
                version: snapshot.version(),
                outcome: QueryOutcome::NoCandidates,
                semantic_degraded: false,
                hits: Vec::new(),
            };
        }

        let query_vec = self.embed_query(snapshot, normalized);
        let semantic_degraded = query_vec.is_none();
        let lexical = lexical_scores(snapshot, normalized);

        struct Scored {
            ordinal: usize,
            score: f64,
            semantic: f64,
            lexical: f64,
        }

        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .map(|ordinal| {
                let semantic = match (&query_vec, snapshot.embedding(ordinal)) {
                    (Some(q), Some(c)) => f64::from(dot(q, c)).clamp(0.0, 1.0),
                    _ => 0.0,
                };
                let lexical = lexical.get(&ordinal).copied().unwrap_or(0.0);
                Scored {
                    ordinal,
                    score: self.params.combine(semantic, lexical),
                    semantic,
                    lexical,
                }
            })
            .filter(|s| s.score > self.params.min_relevance)
            .collect();

        if scored.is_empty() {
            return QueryResult {
                version: snapshot.version(),
                outcome: QueryOutcome::NoConfidentMatch,
                semantic_degraded,
                hits: Vec::new(),
            };
        }

        let chunks = snapshot.chunks();
        scored.sort_by(|a, b| {
            let (ca, cb) = (&chunks[a.ordinal], &chunks[b.ordinal]);
            b.score
                .total_cmp(&a.score)
                .then_with(|| ca.path.cmp(&cb.path))
                .then_with(|| ca.part.cmp(&cb.part))
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|s| {
                let chunk = &chunks[s.ordinal];
                Hit {
                    chunk_id: chunk.id.clone(),
                    score: s.score,
                    matched_category: filter
                        .map(str::to_string)
                        .or_else(|| chunk.categories.iter().next().cloned()),
                    semantic: s.semantic,
                    lexical: s.lexical,
                    path: chunk.path.clone(),
                    source_url: chunk.source_url.clone(),
                    snippet: snippet(&chunk.text),
                }
            })
            .collect();

        QueryResult {
            version: snapshot.version(),
            outcome: QueryOutcome::Matched,
            semantic_degraded,
            hits,
        }
    }

    /// Unit query vector, or `None` when it cannot be compared with the
    /// snapshot's vectors.
    fn embed_query(&self, snapshot: &Snapshot, normalized: &str) -> Option<Vec<f32>> {
        let mut vec = self.embedder.embed(normalized).ok()?;
        if vec.len() != snapshot.dims() {
            return None;
        }
        l2_normalize(&mut vec);
        Some(vec)
    }
}

/// Ordinal → fraction of distinct query tokens the chunk contains.
fn lexical_scores(snapshot: &Snapshot, normalized: &str) -> HashMap<usize, f64> {
    let mut tokens = index_tokens(normalized);
    tokens.sort_unstable();
    tokens.dedup();
    let mut counts: HashMap<usize, usize> = HashMap::new();
    if tokens.is_empty() {
        return HashMap::new();
    }
    for token in &tokens {
        for &ordinal in snapshot.postings(token) {
            *counts.entry(ordinal).or_default() += 1;
        }
    }
    let total = tokens.len() as f64;
    counts
        .into_iter()
        .map(|(ordinal, n)| (ordinal, n as f64 / total))
        .collect()
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SNIPPET_CHARS) {
        Some((end, _)) => format!("{}…", trimmed[..end].trim_end()),
        None => trimmed.to_string(),
    }
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("version", &self.reader.version())
            .field("categories", &self.taxonomy.len())
            .field("params", &self.params)
            .finish()
    }
}
