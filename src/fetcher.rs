use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::Feed;
use reqwest::Client;
use tracing::debug;

use crate::extract;
use crate::types::{CourierError, FetchConfig, Result};

/// Seam between the orchestrator and the network, so checks can run
/// against canned feeds in tests.
#[async_trait]
pub trait FetchFeed: Send + Sync {
    /// Fetch and parse one feed. Any failure (connect, timeout, bad
    /// status, unparsable body) comes back as an error carrying the
    /// diagnostic; the caller decides what a failed feed means.
    async fn fetch(&self, url: &str) -> Result<Feed>;
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

#[async_trait]
impl FetchFeed for Fetcher {
    async fn fetch(&self, url: &str) -> Result<Feed> {
        debug!(%url, "fetching feed");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        let feed = extract::parse_feed(&body)?;
        debug!(%url, entries = feed.entries.len(), "fetched feed");
        Ok(feed)
    }
}
