//! Calendar feed sources - remote .ics over HTTP or a local file

use crate::infra::config::Config;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Where the raw calendar text comes from
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    async fn fetch(&self) -> anyhow::Result<String>;
}

/// HTTP GET of a published .ics URL
pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self { url: url.to_string(), client })
    }
}

#[async_trait]
impl CalendarSource for HttpFeed {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "text/calendar, */*")
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Feed {} returned HTTP {}", self.url, status.as_u16());
        }

        let body = response.text().await.context("Failed to read feed body")?;
        debug!(bytes = %body.len(), "feed_downloaded");
        Ok(body)
    }
}

/// Local .ics file, read on every fetch
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CalendarSource for FileFeed {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read feed file {}", self.path.display()))
    }
}

/// Pick the configured source: URL first, then local path
pub fn source_from_config(config: &Config) -> anyhow::Result<Arc<dyn CalendarSource>> {
    if let Some(url) = config.feed_url() {
        info!(url = %url, "feed_source_http");
        let feed = HttpFeed::new(url, Duration::from_millis(config.feed_timeout_ms()))?;
        return Ok(Arc::new(feed));
    }
    if let Some(path) = config.feed_path() {
        info!(path = %path, "feed_source_file");
        return Ok(Arc::new(FileFeed::new(path)));
    }
    bail!("No calendar feed configured: set feed.url or feed.path")
}
