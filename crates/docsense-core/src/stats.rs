//! Write-side query statistics.
//!
//! The retrieval engine reports one [`QueryObservation`] per completed
//! query. Sinks must not fail visibly; persistence errors are theirs to
//! swallow.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryObservation {
    /// Length of the normalized query, in characters.
    pub query_len: usize,
    pub matched_categories: Vec<String>,
    pub result_count: usize,
}

pub trait StatsSink: Send + Sync {
    fn record(&self, observation: &QueryObservation);
}

/// Discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn record(&self, _observation: &QueryObservation) {}
}

/// In-process counters.
#[derive(Debug, Default)]
pub struct MemoryStats {
    inner: Mutex<MemoryTotals>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryTotals {
    pub queries: u64,
    pub empty_results: u64,
    pub by_category: BTreeMap<String, u64>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> MemoryTotals {
        self.inner.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl StatsSink for MemoryStats {
    fn record(&self, observation: &QueryObservation) {
        let Ok(mut totals) = self.inner.lock() else {
            return;
        };
        totals.queries += 1;
        if observation.result_count == 0 {
            totals.empty_results += 1;
        }
        for category in &observation.matched_categories {
            *totals.by_category.entry(category.clone()).or_default() += 1;
        }
    }
}
