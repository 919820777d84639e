//! Query log recorder.
//!
//! Appends one JSON object per completed query to a JSON-lines file. The
//! read side (summaries, dashboards) is left to external tooling.

use chrono::Utc;
use docsense_core::{NoopStats, QueryObservation, StatsSink};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::StatsConfig;

/// Build the configured sink: a JSONL recorder, or [`NoopStats`] when no
/// path is set.
pub fn create_stats(config: &StatsConfig) -> Arc<dyn StatsSink> {
    match &config.path {
        Some(path) => Arc::new(JsonlStatsRecorder::new(path)),
        None => Arc::new(NoopStats),
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    query_len: usize,
    categories: &'a [String],
    result_count: usize,
}

pub struct JsonlStatsRecorder {
    path: PathBuf,
    // Serializes appends so lines from concurrent queries never interleave.
    lock: Mutex<()>,
}

impl JsonlStatsRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, observation: &QueryObservation) -> std::io::Result<()> {
        let line = LogLine {
            timestamp: Utc::now().to_rfc3339(),
            query_len: observation.query_len,
            categories: &observation.matched_categories,
            result_count: observation.result_count,
        };
        let mut json = serde_json::to_string(&line)?;
        json.push('\n');

        let _held = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(json.as_bytes())
    }
}

impl StatsSink for JsonlStatsRecorder {
    fn record(&self, observation: &QueryObservation) {
        if let Err(e) = self.append(observation) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to record query stats");
        }
    }
}
