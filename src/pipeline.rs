//! Knowledge pipeline stages.
//!
//! Coordinates one pass of crawler → section chunking → categorization →
//! snapshot build. The async half ([`scrape`]) drains the crawl stream;
//! the sync half ([`index`]) is CPU and embedding work meant for the
//! blocking pool.

use docsense_core::chunk::chunk_section;
use docsense_core::{build_snapshot, Categorizer, Chunk, Embedder, Snapshot};
use futures::StreamExt;
use std::sync::Arc;
use url::Url;

use crate::refresh::RefreshError;
use crate::scraper::{crawl, canonicalize, CrawlOptions, PageFetcher, PageRecord};

/// Everything a crawl produced, ready for indexing.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub chunks: Vec<Chunk>,
    pub pages: usize,
    pub soft_failures: usize,
}

/// Crawl the site and chunk every extracted section.
///
/// Fails with [`RefreshError::RootUnreachable`] when the root page itself
/// cannot be fetched and with [`RefreshError::NoPages`] when no page
/// yielded content. Every other page failure is logged and skipped.
pub async fn scrape(
    fetcher: Arc<dyn PageFetcher>,
    root: Url,
    options: CrawlOptions,
    max_tokens: usize,
) -> Result<ScrapeOutcome, RefreshError> {
    let root = canonicalize(&root);
    let mut pages = crawl(fetcher, root.clone(), options);
    let mut outcome = ScrapeOutcome::default();

    while let Some(item) = pages.next().await {
        match item {
            Ok(page) => {
                tracing::debug!(url = %page.url, sections = page.sections.len(), "page extracted");
                outcome.pages += 1;
                outcome.chunks.extend(page_chunks(&page, max_tokens));
            }
            Err(failure) if failure.is_unreachable() && failure.url() == &root => {
                return Err(RefreshError::RootUnreachable(failure.to_string()));
            }
            Err(failure) => {
                tracing::warn!(%failure, "skipping page");
                outcome.soft_failures += 1;
            }
        }
    }

    if outcome.pages == 0 {
        return Err(RefreshError::NoPages);
    }
    Ok(outcome)
}

/// Split a page's sections into chunks tagged with the page URL.
pub fn page_chunks(page: &PageRecord, max_tokens: usize) -> Vec<Chunk> {
    page.sections
        .iter()
        .flat_map(|section| chunk_section(&section.path, &section.text, max_tokens))
        .map(|chunk| chunk.with_source_url(page.url.as_str()))
        .collect()
}

/// Categorize chunks and build the next snapshot.
pub fn index(
    chunks: Vec<Chunk>,
    categorizer: &Categorizer,
    embedder: &dyn Embedder,
    version: u64,
) -> Result<Snapshot, RefreshError> {
    let chunks = categorizer
        .categorize_all(chunks)
        .map_err(|e| RefreshError::Index(e.to_string()))?;
    build_snapshot(chunks, embedder, version).map_err(|e| RefreshError::Index(e.to_string()))
}
