//! Refresh scheduling and atomic snapshot publication.
//!
//! A refresh cycle walks `Scraping → Indexing → Publishing → Idle`. The new
//! snapshot is built off to the side and installed with a single atomic
//! swap, so queries in flight keep answering from the snapshot they
//! captured. A cycle whose content digest matches the published snapshot
//! skips `Publishing` entirely and leaves the current `Arc` in place.
//!
//! At most one cycle runs at a time. Explicit requests arriving during a
//! cycle are coalesced ([`RefreshAck::AlreadyInProgress`]). A failed cycle
//! keeps the last good snapshot and is not retried until the next trigger.
//!
//! # Triggers
//!
//! - [`RefreshScheduler::run`]: `tokio::time::interval` loop, optionally
//!   firing once at startup.
//! - [`RefreshScheduler::request_refresh`]: on-demand, runs in the background.
//! - [`RefreshScheduler::refresh_now`]: on-demand, awaits the report.

use chrono::{DateTime, Utc};
use docsense_core::{CachedEmbedder, Categorizer, Embedder, SnapshotPublisher, SnapshotReader};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use url::Url;

use crate::pipeline;
use crate::scraper::{CrawlOptions, PageFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Scraping,
    Indexing,
    Publishing,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("root page unreachable: {0}")]
    RootUnreachable(String),
    #[error("no pages with extractable content")]
    NoPages,
    #[error("indexing failed: {0}")]
    Index(String),
    #[error("refresh cycle exceeded {0:?}")]
    Timeout(Duration),
    #[error("refresh task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshAck {
    Accepted,
    AlreadyInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Published { version: u64 },
    Unchanged { version: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RefreshEvent {
    Started,
    Published { version: u64, chunks: usize },
    Unchanged { version: u64 },
    Failed { reason: String },
}

/// Summary of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// States entered, in order.
    pub transitions: Vec<RefreshState>,
    pub outcome: RefreshOutcome,
    pub pages: usize,
    pub soft_failures: usize,
    pub chunks: usize,
}

impl RefreshReport {
    pub fn published(&self) -> bool {
        matches!(self.outcome, RefreshOutcome::Published { .. })
    }
}

/// Embedder used by refresh cycles, rotated once per successful build.
pub type EmbeddingCache = CachedEmbedder<Arc<dyn Embedder>>;

/// Point-in-time view for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub version: u64,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub chunks: usize,
    pub model: String,
    pub cached_embeddings: usize,
    pub last_failure: Option<String>,
    pub last_report: Option<RefreshReport>,
}

/// Source and timing settings for a scheduler.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub root: Url,
    pub crawl: CrawlOptions,
    pub max_tokens: usize,
    pub max_cycle: Duration,
}

pub struct RefreshScheduler {
    settings: RefreshSettings,
    fetcher: Arc<dyn PageFetcher>,
    categorizer: Arc<Categorizer>,
    embedder: Arc<EmbeddingCache>,
    publisher: SnapshotPublisher,
    running: Arc<AtomicBool>,
    state: watch::Sender<RefreshState>,
    events: broadcast::Sender<RefreshEvent>,
    last_failure: Mutex<Option<String>>,
    last_report: Mutex<Option<RefreshReport>>,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Progress {
    transitions: Vec<RefreshState>,
    pages: usize,
    soft_failures: usize,
    chunks: usize,
}

impl RefreshScheduler {
    pub fn new(
        settings: RefreshSettings,
        fetcher: Arc<dyn PageFetcher>,
        categorizer: Arc<Categorizer>,
        embedder: Arc<EmbeddingCache>,
        publisher: SnapshotPublisher,
    ) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        let (events, _) = broadcast::channel(64);
        Self {
            settings,
            fetcher,
            categorizer,
            embedder,
            publisher,
            running: Arc::new(AtomicBool::new(false)),
            state,
            events,
            last_failure: Mutex::new(None),
            last_report: Mutex::new(None),
        }
    }

    pub fn reader(&self) -> SnapshotReader {
        self.publisher.reader()
    }

    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    /// Watch state transitions as they happen.
    pub fn watch_state(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> RefreshStatus {
        let snapshot = self.publisher.current();
        RefreshStatus {
            state: self.state(),
            version: snapshot.version(),
            digest: snapshot.digest().to_string(),
            created_at: snapshot.created_at(),
            chunks: snapshot.len(),
            model: snapshot.model().to_string(),
            cached_embeddings: self.embedder.len(),
            last_failure: self.last_failure.lock().ok().and_then(|f| f.clone()),
            last_report: self.last_report.lock().ok().and_then(|r| r.clone()),
        }
    }

    /// Start a cycle in the background unless one is already running.
    pub fn request_refresh(self: &Arc<Self>) -> RefreshAck {
        let Some(guard) = self.try_claim() else {
            tracing::info!("refresh requested while a cycle is running; coalesced");
            return RefreshAck::AlreadyInProgress;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.cycle(guard).await;
        });
        RefreshAck::Accepted
    }

    /// Run a cycle and wait for it. Returns `None` if one is already running.
    pub async fn refresh_now(&self) -> Option<RefreshReport> {
        let guard = self.try_claim()?;
        Some(self.cycle(guard).await)
    }

    /// Periodic trigger loop. Never returns.
    pub async fn run(self: Arc<Self>, interval: Duration, on_start: bool) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;
        if on_start {
            self.scheduled_cycle().await;
        }
        loop {
            ticker.tick().await;
            self.scheduled_cycle().await;
        }
    }

    async fn scheduled_cycle(&self) {
        if self.refresh_now().await.is_none() {
            tracing::info!("scheduled refresh skipped; a cycle is already running");
        }
    }

    fn try_claim(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(Arc::clone(&self.running)))
    }

    fn transition(&self, progress: &mut Progress, next: RefreshState) {
        progress.transitions.push(next);
        self.state.send_replace(next);
    }

    async fn cycle(&self, guard: RunningGuard) -> RefreshReport {
        let guard = Arc::new(guard);
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut progress = Progress::default();
        let _ = self.events.send(RefreshEvent::Started);
        tracing::info!(root = %self.settings.root, "refresh cycle started");

        // A timeout cannot interrupt embedding already on the blocking pool.
        // That task holds its own guard, so no new cycle starts until it ends.
        let result = match tokio::time::timeout(
            self.settings.max_cycle,
            self.stages(&mut progress, &guard),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout(self.settings.max_cycle)),
        };

        let outcome = match result {
            Ok(outcome) => {
                if let Ok(mut failure) = self.last_failure.lock() {
                    *failure = None;
                }
                outcome
            }
            Err(err) => {
                self.transition(&mut progress, RefreshState::Failed);
                tracing::warn!(error = %err, "refresh cycle failed; keeping current snapshot");
                let reason = err.to_string();
                if let Ok(mut failure) = self.last_failure.lock() {
                    *failure = Some(reason.clone());
                }
                let _ = self.events.send(RefreshEvent::Failed {
                    reason: reason.clone(),
                });
                RefreshOutcome::Failed { reason }
            }
        };

        let report = RefreshReport {
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
            transitions: progress.transitions,
            outcome,
            pages: progress.pages,
            soft_failures: progress.soft_failures,
            chunks: progress.chunks,
        };
        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(report.clone());
        }
        report
    }

    async fn stages(
        &self,
        progress: &mut Progress,
        guard: &Arc<RunningGuard>,
    ) -> Result<RefreshOutcome, RefreshError> {
        self.transition(progress, RefreshState::Scraping);
        let scraped = pipeline::scrape(
            Arc::clone(&self.fetcher),
            self.settings.root.clone(),
            self.settings.crawl.clone(),
            self.settings.max_tokens,
        )
        .await?;
        progress.pages = scraped.pages;
        progress.soft_failures = scraped.soft_failures;
        tracing::info!(
            pages = scraped.pages,
            soft_failures = scraped.soft_failures,
            chunks = scraped.chunks.len(),
            "scrape finished"
        );

        self.transition(progress, RefreshState::Indexing);
        let current = self.publisher.current();
        let version = current.version() + 1;
        let categorizer = Arc::clone(&self.categorizer);
        let embedder = Arc::clone(&self.embedder);
        let chunks = scraped.chunks;
        let held = Arc::clone(guard);
        let snapshot = tokio::task::spawn_blocking(move || {
            let _held = held;
            let snapshot = pipeline::index(chunks, &categorizer, embedder.as_ref(), version)?;
            embedder.rotate();
            Ok::<_, RefreshError>(snapshot)
        })
        .await
        .map_err(|e| RefreshError::Join(e.to_string()))??;
        progress.chunks = snapshot.len();

        if snapshot.digest() == current.digest() {
            self.transition(progress, RefreshState::Idle);
            tracing::info!(version = current.version(), "content unchanged; nothing to publish");
            let _ = self.events.send(RefreshEvent::Unchanged {
                version: current.version(),
            });
            return Ok(RefreshOutcome::Unchanged {
                version: current.version(),
            });
        }

        self.transition(progress, RefreshState::Publishing);
        let chunks = snapshot.len();
        let duplicates = snapshot.build_stats().duplicates;
        let retired = self.publisher.publish(Arc::new(snapshot));
        tracing::info!(
            version,
            chunks,
            duplicates,
            retired = retired.version(),
            "snapshot published"
        );
        self.transition(progress, RefreshState::Idle);
        let _ = self.events.send(RefreshEvent::Published { version, chunks });
        Ok(RefreshOutcome::Published { version })
    }
}
