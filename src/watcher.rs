use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::dedup::{self, DedupStore};
use crate::extract;
use crate::fetcher::FetchFeed;
use crate::types::{Article, Result};

/// Orchestrates one ingestion pass: fans out over the registered
/// feeds, filters each against the dedup index, and returns only what
/// is new. All handles are injected so tests can swap the fetch seam.
pub struct FeedWatcher {
    config: Arc<ConfigStore>,
    dedup: Arc<DedupStore>,
    fetcher: Arc<dyn FetchFeed>,
}

impl FeedWatcher {
    pub fn new(
        config: Arc<ConfigStore>,
        dedup: Arc<DedupStore>,
        fetcher: Arc<dyn FetchFeed>,
    ) -> Self {
        Self {
            config,
            dedup,
            fetcher,
        }
    }

    /// Checks every registered feed concurrently (one task per feed,
    /// all joined before returning) and maps feed id to its new
    /// articles. Feeds with nothing new are absent from the map. A
    /// failing feed is logged and skipped; it never aborts the pass.
    pub async fn check_all_feeds(&self) -> HashMap<String, Vec<Article>> {
        let feeds = self.config.feeds();
        if feeds.is_empty() {
            debug!("no feeds registered");
            return HashMap::new();
        }
        let max_articles = self.config.settings().max_articles_per_feed;
        info!(feeds = feeds.len(), "checking feeds");

        let mut tasks: JoinSet<(String, Result<Vec<Article>>)> = JoinSet::new();
        for (id, descriptor) in feeds {
            if descriptor.url.trim().is_empty() {
                debug!(feed = %id, "skipping feed with empty URL");
                continue;
            }
            let fetcher = Arc::clone(&self.fetcher);
            let dedup = Arc::clone(&self.dedup);
            tasks.spawn(async move {
                let result =
                    check_feed(fetcher.as_ref(), dedup.as_ref(), &descriptor.url, max_articles)
                        .await;
                (id, result)
            });
        }

        let mut new_by_feed = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(articles))) => {
                    if !articles.is_empty() {
                        info!(feed = %id, new_articles = articles.len(), "feed has new articles");
                        new_by_feed.insert(id, articles);
                    }
                }
                Ok((id, Err(e))) => {
                    warn!(feed = %id, error = %e, "feed check failed, skipping this cycle");
                }
                Err(e) => {
                    warn!(error = %e, "feed task did not complete");
                }
            }
        }
        new_by_feed
    }
}

/// Fetch one feed and keep only unseen articles, marking each as seen
/// the moment it is kept. Marking before delivery means a crash can
/// lose an announcement but never repeat one.
async fn check_feed(
    fetcher: &dyn FetchFeed,
    dedup: &DedupStore,
    url: &str,
    max: usize,
) -> Result<Vec<Article>> {
    let feed = fetcher.fetch(url).await?;
    let mut fresh = Vec::new();
    for article in extract::articles(&feed, url, max) {
        let fp = dedup::fingerprint(&article.title, &article.link);
        if dedup.seen(&fp) {
            continue;
        }
        dedup.mark_seen(&fp, Utc::now())?;
        fresh.push(article);
    }
    Ok(fresh)
}
