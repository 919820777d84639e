//! Embedding provider selection and the OpenAI backend.
//!
//! The [`Embedder`] trait and the offline [`HashEmbedder`] live in
//! `docsense-core`. This module adds:
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`create_embedder`]**: builds the configured provider. Refresh wraps
//!   it in a [`CachedEmbedder`](docsense_core::CachedEmbedder); queries use it
//!   directly so free-text input never accumulates in the cache.
//!
//! # Provider Selection
//!
//! ```rust
//! # use docsense::config::EmbeddingConfig;
//! # use docsense::embedding::create_embedder;
//! # use docsense_core::Embedder;
//! let config = EmbeddingConfig::default(); // provider = "hash"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "hash-trigram-v1");
//! assert_eq!(embedder.dims(), 384);
//! ```
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Calls are blocking. Async callers must run them on the blocking pool.

use anyhow::{bail, Result};
use docsense_core::{EmbedError, Embedder, HashEmbedder};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Create the configured embedder.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hash"` | [`HashEmbedder`] (default 384 dims) |
/// | `"openai"` | [`OpenAIEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => {
            let dims = config.dims.unwrap_or(384);
            Ok(Arc::new(HashEmbedder::new(dims)))
        }
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            dims,
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn request(
        &self,
        client: &reqwest::blocking::Client,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                std::thread::sleep(delay);
            }

            let resp = client
                .post(OPENAI_EMBEDDINGS_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send();

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .map_err(|e| EmbedError::Provider(e.to_string()))?;
                        return parse_openai_response(&json);
                    }

                    // Rate limited or server error: retry
                    let body_text = response.text().unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429): no retry
                    return Err(EmbedError::Provider(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(EmbedError::Provider(
            last_err.unwrap_or_else(|| "Embedding failed after retries".to_string()),
        ))
    }
}

impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Provider("Empty embedding response".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EmbedError::Provider(e.to_string()))?;

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.request(&client, batch)?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::BatchSize {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            for v in &vectors {
                if v.len() != self.dims {
                    return Err(EmbedError::Dimensions {
                        expected: self.dims,
                        actual: v.len(),
                    });
                }
            }
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::Provider("Invalid OpenAI response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EmbedError::Provider("Invalid OpenAI response: missing embedding".into())
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
