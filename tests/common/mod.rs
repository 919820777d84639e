//! Shared fixtures: an in-memory documentation site behind `PageFetcher`.

#![allow(dead_code)]

use async_trait::async_trait;
use docsense::config::{parse_config, Config};
use docsense::scraper::{FetchError, FetchedPage, PageFetcher};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

pub const ROOT: &str = "https://docs.example.com/guide";

#[derive(Clone)]
pub enum Resource {
    Html(String),
    Status(u16),
    Unreachable,
    /// Responds after the given delay.
    Slow(Duration, String),
}

/// A site keyed by exact URL string (as requested, fragments included).
#[derive(Default)]
pub struct InMemorySite {
    pages: Mutex<HashMap<String, Resource>>,
    hits: Mutex<Vec<String>>,
}

impl InMemorySite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.set(url, Resource::Html(html.to_string()));
        self
    }

    pub fn with(self, url: &str, resource: Resource) -> Self {
        self.set(url, resource);
        self
    }

    pub fn set(&self, url: &str, resource: Resource) {
        self.pages.lock().unwrap().insert(url.to_string(), resource);
    }

    /// URLs fetched so far, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, url: &str) -> usize {
        self.hits().iter().filter(|h| h.as_str() == url).count()
    }
}

#[async_trait]
impl PageFetcher for InMemorySite {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.hits.lock().unwrap().push(url.to_string());
        let resource = self.pages.lock().unwrap().get(url.as_str()).cloned();
        match resource {
            Some(Resource::Html(body)) => Ok(FetchedPage {
                url: url.clone(),
                body,
            }),
            Some(Resource::Slow(delay, body)) => {
                tokio::time::sleep(delay).await;
                Ok(FetchedPage {
                    url: url.clone(),
                    body,
                })
            }
            Some(Resource::Status(code)) => Err(FetchError::Status(code)),
            Some(Resource::Unreachable) => {
                Err(FetchError::Transport("connection refused".to_string()))
            }
            None => Err(FetchError::Status(404)),
        }
    }
}

pub fn doc(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><main><h1>{title}</h1>{body}</main></body></html>"
    )
}

/// A three-page site: setup, judging, and inviting judges.
pub fn help_site() -> InMemorySite {
    InMemorySite::new()
        .page(
            ROOT,
            &doc(
                "Guide",
                r#"<p>Welcome to the event platform help center.</p>
                   <a href="/guide/setup">Setup</a>
                   <a href="/guide/judging">Judging</a>
                   <a href="/guide/invite/">Invite</a>"#,
            ),
        )
        .page(
            "https://docs.example.com/guide/setup",
            &doc(
                "Setup",
                r#"<p>Connect wallet from the top right corner.</p>
                   <a href="/guide/judging#rubric">Rubric</a>"#,
            ),
        )
        .page(
            "https://docs.example.com/guide/judging",
            &doc("Judging", "<p>Judges apply the scoring rubric to each entry.</p>"),
        )
        .page(
            "https://docs.example.com/guide/invite/",
            &doc("Invite", "<p>To add a judge, open the event and send an invite.</p>"),
        )
}

pub fn config_toml(extra: &str) -> String {
    format!(
        r#"
[source]
root_url = "{ROOT}"
politeness_delay_ms = 0
page_timeout_secs = 5

[embedding]
provider = "hash"
dims = 256

[refresh]
max_cycle_secs = 30
on_start = false

[[categories]]
name = "setup"
descriptors = ["setup", "connect wallet"]

[[categories]]
name = "judging"
descriptors = ["judging", "scoring rubric"]

[[categories]]
name = "invite"
descriptors = ["invite", "add judge"]

[[categories]]
name = "billing"
descriptors = ["invoice", "payment"]

{extra}
"#
    )
}

pub fn test_config() -> Config {
    parse_config(&config_toml("")).unwrap()
}
