//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! a deterministic offline [`HashEmbedder`], a memoizing [`CachedEmbedder`]
//! wrapper, and pure helpers for similarity and normalization.
//!
//! Network-backed providers (OpenAI) live in the `docsense` app crate.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::models::content_hash;
use crate::normalize::{normalize_text, tokenize};

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding provider failed: {0}")]
    Provider(String),
    #[error("expected {expected} dimensions, got {actual}")]
    Dimensions { expected: usize, actual: usize },
    #[error("provider returned {actual} vectors for {expected} inputs")]
    BatchSize { expected: usize, actual: usize },
}

/// A text-to-vector function.
///
/// Implementations must be deterministic for a given model: embedding the
/// same text twice yields the same vector. Callers are synchronous; async
/// runtimes should invoke embedders from a blocking context.
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"hash-trigram-v1"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed many texts, preserving order.
    ///
    /// The default calls [`Embedder::embed`] once per text. Providers with a
    /// native batch endpoint should override it.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
    fn dims(&self) -> usize {
        (**self).dims()
    }
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        (**self).embed_batch(texts)
    }
}

/// Feature-hashing embedder over word unigrams and character trigrams.
///
/// Needs no model files or network access. Words contribute with weight 1.0
/// and trigrams with weight 0.5, each hashed into one of `dims` buckets with
/// a sign bit taken from the hash. Output vectors are unit length.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub const MODEL: &'static str = "hash-trigram-v1";

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        Self::MODEL
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vec = vec![0.0f32; self.dims];
        for token in tokenize(&normalize_text(text)) {
            self.add_feature(&mut vec, token.as_bytes(), 1.0);

            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                self.add_feature(&mut vec, gram.as_bytes(), 0.5);
            }
        }
        l2_normalize(&mut vec);
        Ok(vec)
    }
}

impl HashEmbedder {
    fn add_feature(&self, vec: &mut [f32], feature: &[u8], weight: f32) {
        let h = fnv1a(feature);
        let bucket = (h % self.dims as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign * weight;
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Memoizes another embedder by content hash.
///
/// Chunks whose text did not change between refreshes are never
/// re-embedded, and the categorizer's fallback stage and the indexer share
/// results for the same text.
///
/// Entries live in two generations. [`CachedEmbedder::rotate`] retires the
/// current generation and drops the one before it, so a vector survives
/// only while some cycle keeps asking for it. Call it once per refresh.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Mutex<Generations>,
}

#[derive(Default)]
struct Generations {
    current: HashMap<String, Vec<f32>>,
    previous: HashMap<String, Vec<f32>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: Mutex::new(Generations::default()),
        }
    }

    /// Number of cached vectors across both generations.
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .map(|c| c.current.len() + c.previous.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a new generation, dropping vectors unused since the last rotation.
    pub fn rotate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.previous = std::mem::take(&mut cache.current);
        }
    }

    fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(v) = cache.current.get(key) {
            return Some(v.clone());
        }
        let v = cache.previous.remove(key)?;
        cache.current.insert(key.to_string(), v.clone());
        Some(v)
    }

    fn put(&self, key: String, vec: Vec<f32>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.current.insert(key, vec);
        }
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let key = content_hash(text);
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }
        let v = self.inner.embed(text)?;
        self.put(key, v.clone());
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let keys: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
        let mut out: Vec<Option<Vec<f32>>> = keys.iter().map(|k| self.get(k)).collect();

        let missing: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();
        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.inner.embed_batch(&batch)?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::BatchSize {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            for (&i, v) in missing.iter().zip(vectors) {
                self.put(keys[i].clone(), v.clone());
                out[i] = Some(v);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Dot product of two equal-length vectors; `0.0` on length mismatch.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale `vec` to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}
