use chrono::Utc;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;

use crate::types::{Article, CourierError, Result};

/// Parse raw RSS/Atom bytes into a feed model.
pub fn parse_feed(content: &[u8]) -> Result<Feed> {
    parser::parse(content).map_err(|e| CourierError::Parse(format!("failed to parse feed: {e}")))
}

/// Normalize up to `max` entries into articles, in feed order. Pure:
/// dedup filtering happens in the orchestrator so the validator can
/// reuse this without side effects.
pub fn articles(feed: &Feed, feed_url: &str, max: usize) -> Vec<Article> {
    let feed_title = feed
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "Unknown Feed".to_string());

    feed.entries
        .iter()
        .take(max)
        .map(|entry| article_from_entry(entry, &feed_title, feed_url))
        .collect()
}

fn article_from_entry(entry: &Entry, feed_title: &str, feed_url: &str) -> Article {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "No Title".to_string());

    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    // RSS <description> and Atom <summary> both land in `summary`;
    // full-content bodies are the fallback.
    let description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .unwrap_or_default();

    let published = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .unwrap_or_default();

    Article {
        title,
        link,
        description,
        published,
        feed_title: feed_title.to_string(),
        feed_url: feed_url.to_string(),
    }
}
