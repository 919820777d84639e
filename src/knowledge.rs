//! Wiring of the retrieval engine and refresh scheduler from configuration.

use anyhow::{Context, Result};
use docsense_core::{
    snapshot_channel, CachedEmbedder, Categorizer, Embedder, RetrievalEngine, Snapshot,
};
use std::sync::Arc;
use url::Url;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::refresh::{RefreshScheduler, RefreshSettings};
use crate::scraper::{CrawlOptions, HttpFetcher, PageFetcher};
use crate::stats::create_stats;

/// The query side and the refresh side, sharing one snapshot cell.
///
/// Starts on the empty version-0 snapshot; nothing is answered until the
/// first refresh publishes.
#[derive(Clone)]
pub struct KnowledgeBase {
    pub engine: Arc<RetrievalEngine>,
    pub scheduler: Arc<RefreshScheduler>,
    pub default_k: usize,
}

impl KnowledgeBase {
    /// Build against the live documentation site.
    pub async fn open(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.source.user_agent, config.source.page_timeout())?;
        Self::open_with_fetcher(config, Arc::new(fetcher)).await
    }

    /// Build with a caller-supplied fetcher.
    pub async fn open_with_fetcher(config: &Config, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let root = Url::parse(&config.source.root_url)
            .with_context(|| format!("Invalid source.root_url: {}", config.source.root_url))?;
        let embedder = create_embedder(&config.embedding)?;
        // Only refresh goes through the cache; query text never lands in it.
        let cache = Arc::new(CachedEmbedder::new(Arc::clone(&embedder)));
        let taxonomy = config.taxonomy();

        // Descriptor embeddings may hit a blocking HTTP provider.
        let categorizer = {
            let taxonomy = taxonomy.clone();
            let embedder: Arc<dyn Embedder> = cache.clone();
            let threshold = config.retrieval.category_threshold;
            tokio::task::spawn_blocking(move || Categorizer::new(&taxonomy, embedder, threshold))
                .await
                .context("Categorizer setup task failed")?
                .context("Failed to embed category descriptors")?
        };

        let (publisher, reader) = snapshot_channel(Snapshot::empty());
        let engine = RetrievalEngine::new(
            reader,
            taxonomy,
            Arc::clone(&embedder),
            config.retrieval.params(),
        )
        .with_stats(create_stats(&config.stats));

        let settings = RefreshSettings {
            root,
            crawl: CrawlOptions::from_config(config),
            max_tokens: config.chunking.max_tokens,
            max_cycle: config.refresh.max_cycle(),
        };
        let scheduler = RefreshScheduler::new(
            settings,
            fetcher,
            Arc::new(categorizer),
            cache,
            publisher,
        );

        tracing::info!(
            root = %config.source.root_url,
            categories = engine.taxonomy().len(),
            provider = %config.embedding.provider,
            "knowledge base ready"
        );

        Ok(Self {
            engine: Arc::new(engine),
            scheduler: Arc::new(scheduler),
            default_k: config.retrieval.default_k,
        })
    }
}
