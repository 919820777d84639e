//! Core data models used throughout Docsense.
//!
//! These types represent the chunks, taxonomy, and query results that flow
//! through the ingestion and retrieval pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::{normalize_text, search_text};

/// A unit of retrievable documentation content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Stable identifier derived from `path`, `part`, and `hash`.
    pub id: String,
    /// Section titles from the page root down to the leaf heading.
    pub path: Vec<String>,
    /// Piece index when one section was split into several chunks.
    pub part: u32,
    /// Canonical URL of the page this chunk was extracted from.
    pub source_url: Option<String>,
    /// Raw text as extracted.
    pub text: String,
    /// Lowercased, whitespace-collapsed text.
    pub normalized: String,
    /// Category labels assigned by the categorizer.
    pub categories: BTreeSet<String>,
    /// SHA-256 of `text`, used for change detection.
    pub hash: String,
}

impl Chunk {
    /// Create an uncategorized chunk, deriving its id and content hash.
    pub fn new(path: Vec<String>, part: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        let id = chunk_id(&path, part, &hash);
        let normalized = normalize_text(&text);
        Self {
            id,
            path,
            part,
            source_url: None,
            text,
            normalized,
            categories: BTreeSet::new(),
            hash,
        }
    }

    /// Attach the canonical URL of the source page.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Replace the category set.
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories
            .into_iter()
            .map(|c| normalize_text(&c.into()))
            .collect();
        self
    }

    /// Path titles followed by the normalized body.
    ///
    /// This is the text that gets embedded, indexed, and categorized.
    pub fn search_text(&self) -> String {
        search_text(&self.path, &self.normalized)
    }

    /// Path rendered as `"Page › Section › Subsection"`.
    pub fn breadcrumb(&self) -> String {
        self.path.join(" › ")
    }
}

/// SHA-256 hex digest of a chunk's raw text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive a chunk identifier from its structural position and content.
///
/// The id is the first 16 bytes of `SHA-256(path ‖ part ‖ hash)` in hex.
/// Path titles are separated by a unit separator so `["a b"]` and
/// `["a", "b"]` never collide.
pub fn chunk_id(path: &[String], part: u32, hash: &str) -> String {
    let mut hasher = Sha256::new();
    for title in path {
        hasher.update(title.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.update(part.to_le_bytes());
    hasher.update(hash.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// A taxonomy entry: a topic label and the phrases that identify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub descriptors: Vec<String>,
}

impl Category {
    pub fn new<I, S>(name: impl Into<String>, descriptors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            descriptors: descriptors.into_iter().map(Into::into).collect(),
        }
    }
}

/// The fixed, externally configured category enumeration.
///
/// Names are normalized to lowercase on construction; lookups with
/// [`Taxonomy::resolve`] are therefore case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    pub fn new(categories: Vec<Category>) -> Self {
        let categories = categories
            .into_iter()
            .map(|c| Category {
                name: normalize_text(&c.name),
                descriptors: c.descriptors,
            })
            .collect();
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Return the canonical (normalized) name if `name` is in the taxonomy.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let wanted = normalize_text(name);
        self.categories
            .iter()
            .find(|c| c.name == wanted)
            .map(|c| c.name.as_str())
    }
}

/// How a query concluded, independent of how many hits were returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    /// At least one candidate cleared the relevance floor.
    Matched,
    /// Candidates existed but none cleared the relevance floor.
    NoConfidentMatch,
    /// The candidate set was empty (empty snapshot, or no chunk carries the
    /// requested category).
    NoCandidates,
}

/// A single ranked chunk in a [`QueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub chunk_id: String,
    /// Combined relevance in `[0.0, 1.0]`.
    pub score: f64,
    pub matched_category: Option<String>,
    /// Semantic component before weighting.
    pub semantic: f64,
    /// Lexical component before weighting.
    pub lexical: f64,
    pub path: Vec<String>,
    pub source_url: Option<String>,
    pub snippet: String,
}

/// Ranked answer to a query, tagged with the snapshot version that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub version: u64,
    pub outcome: QueryOutcome,
    /// True when the query embedding could not be computed and ranking fell
    /// back to lexical scores only.
    pub semantic_degraded: bool,
    pub hits: Vec<Hit>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}
