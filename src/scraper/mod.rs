//! Breadth-first documentation crawler.
//!
//! [`crawl`] returns a lazy stream: nothing is fetched until the stream is
//! polled, and each poll fetches at most one page. Every page reachable from
//! the root through same-site links is visited once, keyed by its canonical
//! URL (fragment removed, trailing slash trimmed).
//!
//! Failures on individual pages are yielded as [`SoftFetchFailure`] items and
//! traversal continues. Deciding whether a failure is fatal (an unreachable
//! root, for example) is the caller's job.

mod extract;
mod fetch;

pub use extract::{ExtractedPage, Extractor, Section};
pub use fetch::{FetchError, FetchedPage, HttpFetcher, PageFetcher};

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// One successfully extracted page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Canonical URL.
    pub url: Url,
    pub title: String,
    pub sections: Vec<Section>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoftFetchFailure {
    #[error("{url} unreachable: {reason}")]
    Unreachable { url: Url, reason: String },
    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: Url, status: u16 },
    #[error("{url} timed out")]
    Timeout { url: Url },
    #[error("{url} has no extractable content")]
    Empty { url: Url },
}

impl SoftFetchFailure {
    pub fn url(&self) -> &Url {
        match self {
            Self::Unreachable { url, .. }
            | Self::HttpStatus { url, .. }
            | Self::Timeout { url }
            | Self::Empty { url } => url,
        }
    }

    /// True for failures where nothing was fetched.
    pub fn is_unreachable(&self) -> bool {
        !matches!(self, Self::Empty { .. })
    }

    fn from_fetch(url: Url, err: FetchError) -> Self {
        match err {
            FetchError::Transport(reason) => Self::Unreachable { url, reason },
            FetchError::Status(status) => Self::HttpStatus { url, status },
            FetchError::Timeout => Self::Timeout { url },
        }
    }
}

pub type CrawlItem = Result<PageRecord, SoftFetchFailure>;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_pages: usize,
    pub page_timeout: Duration,
    pub politeness_delay: Duration,
    pub min_block_chars: usize,
}

impl CrawlOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages: config.source.max_pages,
            page_timeout: config.source.page_timeout(),
            politeness_delay: config.source.politeness_delay(),
            min_block_chars: config.chunking.min_block_chars,
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 500,
            page_timeout: Duration::from_secs(20),
            politeness_delay: Duration::from_millis(250),
            min_block_chars: 15,
        }
    }
}

/// Strip the fragment and any trailing slash (except the root `/`).
pub fn canonicalize(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);
    let path = canonical.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        canonical.set_path(path.trim_end_matches('/'));
    }
    canonical
}

/// Whether `candidate` is on the root's host and under its path.
pub fn in_scope(root: &Url, candidate: &Url) -> bool {
    if !matches!(candidate.scheme(), "http" | "https") {
        return false;
    }
    if candidate.host_str() != root.host_str() || candidate.port() != root.port() {
        return false;
    }
    let base = root.path().trim_end_matches('/');
    let path = candidate.path();
    base.is_empty() || path == base || path.starts_with(&format!("{}/", base))
}

struct CrawlState {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Extractor,
    options: CrawlOptions,
    root: Url,
    queue: VecDeque<Url>,
    seen: HashSet<Url>,
    fetched: usize,
}

impl CrawlState {
    fn enqueue(&mut self, mut url: Url) {
        let canonical = canonicalize(&url);
        if in_scope(&self.root, &canonical) && self.seen.insert(canonical) {
            url.set_fragment(None);
            self.queue.push_back(url);
        }
    }

    async fn next_item(&mut self) -> Option<CrawlItem> {
        if self.fetched >= self.options.max_pages {
            return None;
        }
        let url = self.queue.pop_front()?;
        if self.fetched > 0 && !self.options.politeness_delay.is_zero() {
            tokio::time::sleep(self.options.politeness_delay).await;
        }
        self.fetched += 1;
        let canonical = canonicalize(&url);
        tracing::debug!(url = %canonical, "fetching page");

        let fetched =
            match tokio::time::timeout(self.options.page_timeout, self.fetcher.fetch(&url)).await {
                Ok(Ok(page)) => page,
                Ok(Err(err)) => return Some(Err(SoftFetchFailure::from_fetch(canonical, err))),
                Err(_) => return Some(Err(SoftFetchFailure::Timeout { url: canonical })),
            };

        let page = self.extractor.extract(&fetched.body, &fetched.url);
        // A redirect may land on a page we would otherwise fetch again.
        self.seen.insert(canonicalize(&fetched.url));
        for link in page.links.iter().cloned() {
            self.enqueue(link);
        }

        if page.is_empty() {
            return Some(Err(SoftFetchFailure::Empty { url: canonical }));
        }
        Some(Ok(PageRecord {
            url: canonical,
            title: page.title,
            sections: page.sections,
        }))
    }
}

/// Lazily crawl the site under `root`.
pub fn crawl(
    fetcher: Arc<dyn PageFetcher>,
    root: Url,
    options: CrawlOptions,
) -> BoxStream<'static, CrawlItem> {
    let root = canonicalize(&root);
    let mut state = CrawlState {
        fetcher,
        extractor: Extractor::new(options.min_block_chars),
        options,
        root: root.clone(),
        queue: VecDeque::new(),
        seen: HashSet::new(),
        fetched: 0,
    };
    state.enqueue(root);

    stream::unfold(state, |mut state| async move {
        let item = state.next_item().await?;
        Some((item, state))
    })
    .boxed()
}
