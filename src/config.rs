use anyhow::{Context, Result};
use docsense_core::{Category, RetrievalParams, Taxonomy};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Config {
    pub fn taxonomy(&self) -> Taxonomy {
        Taxonomy::new(self.categories.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root_url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl SourceConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }
}

fn default_max_pages() -> usize {
    500
}
fn default_page_timeout_secs() -> u64 {
    20
}
fn default_politeness_delay_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    format!("docsense/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_min_block_chars")]
    pub min_block_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            min_block_chars: default_min_block_chars(),
        }
    }
}

fn default_max_tokens() -> usize {
    300
}
fn default_min_block_chars() -> usize {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_category_threshold")]
    pub category_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            min_relevance: default_min_relevance(),
            default_k: default_k(),
            category_threshold: default_category_threshold(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            semantic_weight: self.semantic_weight,
            lexical_weight: self.lexical_weight,
            min_relevance: self.min_relevance,
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.75
}
fn default_lexical_weight() -> f64 {
    0.25
}
fn default_min_relevance() -> f64 {
    0.2
}
fn default_k() -> usize {
    5
}
fn default_category_threshold() -> f32 {
    docsense_core::categorize::DEFAULT_CATEGORY_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_cycle_secs")]
    pub max_cycle_secs: u64,
    #[serde(default = "default_on_start")]
    pub on_start: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_cycle_secs: default_max_cycle_secs(),
            on_start: default_on_start(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_cycle(&self) -> Duration {
        Duration::from_secs(self.max_cycle_secs)
    }
}

fn default_interval_secs() -> u64 {
    7 * 24 * 60 * 60
}
fn default_max_cycle_secs() -> u64 {
    30 * 60
}
fn default_on_start() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatsConfig {
    /// JSON-lines query log. Stats are discarded when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate source
    let root = url::Url::parse(&config.source.root_url)
        .with_context(|| format!("source.root_url is not a valid URL: {}", config.source.root_url))?;
    if !matches!(root.scheme(), "http" | "https") {
        anyhow::bail!("source.root_url must be http or https");
    }
    if config.source.max_pages == 0 {
        anyhow::bail!("source.max_pages must be > 0");
    }
    if config.source.page_timeout_secs == 0 {
        anyhow::bail!("source.page_timeout_secs must be > 0");
    }

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // Validate retrieval
    let r = &config.retrieval;
    if r.semantic_weight < 0.0 || r.lexical_weight < 0.0 {
        anyhow::bail!("retrieval weights must be >= 0");
    }
    if r.semantic_weight + r.lexical_weight <= 0.0 {
        anyhow::bail!("retrieval.semantic_weight + retrieval.lexical_weight must be > 0");
    }
    if !(0.0..=1.0).contains(&r.min_relevance) {
        anyhow::bail!("retrieval.min_relevance must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&r.category_threshold) {
        anyhow::bail!("retrieval.category_threshold must be in [0.0, 1.0]");
    }
    if r.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }

    // Validate refresh
    if config.refresh.interval_secs == 0 {
        anyhow::bail!("refresh.interval_secs must be > 0");
    }
    if config.refresh.max_cycle_secs == 0 {
        anyhow::bail!("refresh.max_cycle_secs must be > 0");
    }

    // Validate taxonomy
    let mut seen = HashSet::new();
    for category in &config.categories {
        let name = category.name.trim().to_lowercase();
        if name.is_empty() {
            anyhow::bail!("category names must not be empty");
        }
        if !seen.insert(name) {
            anyhow::bail!("duplicate category: '{}'", category.name);
        }
        if category.descriptors.iter().all(|d| d.trim().is_empty()) {
            anyhow::bail!("category '{}' needs at least one descriptor", category.name);
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}
