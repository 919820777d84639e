//! Page fetching.
//!
//! The crawler only talks to a [`PageFetcher`]; [`HttpFetcher`] is the
//! production implementation backed by `reqwest`. Tests substitute an
//! in-memory site.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A successfully fetched page body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects. Relative links resolve against it.
    pub url: Url,
    pub body: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// `reqwest`-backed fetcher with a fixed user agent and per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(classify)?;
        Ok(FetchedPage {
            url: final_url,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}
