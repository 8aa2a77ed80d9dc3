use url::Url;

use crate::fetcher::FetchFeed;

/// Registration-time checks. None of this runs on the recurring path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("URL is empty")]
    Empty,

    #[error("URL does not parse: {0}")]
    Unparsable(String),

    #[error("URL scheme must be http or https, got {0}")]
    SchemeNotAllowed(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("feed could not be fetched: {0}")]
    Unreachable(String),

    #[error("feed parses but contains no entries")]
    NoEntries,
}

/// What a successful probe learned about the feed, for showing to
/// whoever is registering it.
#[derive(Debug, Clone)]
pub struct FeedProbe {
    pub title: String,
    pub description: String,
    pub entry_count: usize,
    pub latest_entry_title: Option<String>,
}

/// Syntactic check only: parseable, http(s), non-empty host.
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let parsed = Url::parse(url).map_err(|e| ValidationError::Unparsable(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::SchemeNotAllowed(other.to_string())),
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(ValidationError::MissingHost),
    }
    Ok(())
}

/// Validate the URL, then actually fetch it once. A feed that parses
/// but has zero entries is rejected, since it would never produce an
/// article.
pub async fn probe_feed(
    fetcher: &dyn FetchFeed,
    url: &str,
) -> Result<FeedProbe, ValidationError> {
    validate_url(url)?;
    let feed = fetcher
        .fetch(url)
        .await
        .map_err(|e| ValidationError::Unreachable(e.to_string()))?;
    if feed.entries.is_empty() {
        return Err(ValidationError::NoEntries);
    }
    Ok(FeedProbe {
        title: feed
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| "Unknown Feed".to_string()),
        description: feed
            .description
            .as_ref()
            .map(|d| d.content.clone())
            .unwrap_or_default(),
        entry_count: feed.entries.len(),
        latest_entry_title: feed
            .entries
            .first()
            .and_then(|e| e.title.as_ref())
            .map(|t| t.content.clone()),
    })
}
