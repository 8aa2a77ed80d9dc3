use std::sync::Once;

use async_trait::async_trait;
use feed_rs::model::Feed;
use rss_courier::fetcher::FetchFeed;
use rss_courier::validator::{probe_feed, validate_url, ValidationError};
use rss_courier::{extract, CourierError, Result};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

struct CannedFetcher {
    xml: Option<&'static str>,
}

#[async_trait]
impl FetchFeed for CannedFetcher {
    async fn fetch(&self, url: &str) -> Result<Feed> {
        match self.xml {
            Some(xml) => extract::parse_feed(xml.as_bytes()),
            None => Err(CourierError::General(format!("connection refused: {url}"))),
        }
    }
}

const HEALTHY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Probe Target</title>
    <description>A feed worth subscribing to</description>
    <item><title>Latest headline</title><link>https://probe.example/1</link></item>
    <item><title>Older headline</title><link>https://probe.example/2</link></item>
  </channel>
</rss>"#;

const EMPTY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Hollow</title>
  </channel>
</rss>"#;

#[test]
fn only_http_and_https_pass_validation() {
    assert!(validate_url("https://example.com/feed.xml").is_ok());
    assert!(validate_url("http://example.com/rss").is_ok());

    assert!(matches!(
        validate_url("ftp://example.com/feed.xml"),
        Err(ValidationError::SchemeNotAllowed(scheme)) if scheme == "ftp"
    ));
    assert!(matches!(
        validate_url("file:///etc/passwd"),
        Err(ValidationError::SchemeNotAllowed(_))
    ));
}

#[test]
fn empty_and_garbled_urls_are_rejected() {
    assert_eq!(validate_url(""), Err(ValidationError::Empty));
    assert_eq!(validate_url("   "), Err(ValidationError::Empty));
    assert!(matches!(
        validate_url("not a url at all"),
        Err(ValidationError::Unparsable(_))
    ));
}

#[tokio::test]
async fn probing_a_healthy_feed_reports_its_shape() {
    init_tracing();
    let fetcher = CannedFetcher {
        xml: Some(HEALTHY_FEED),
    };
    let probe = probe_feed(&fetcher, "https://probe.example/feed.xml")
        .await
        .unwrap();

    assert_eq!(probe.title, "Probe Target");
    assert_eq!(probe.description, "A feed worth subscribing to");
    assert_eq!(probe.entry_count, 2);
    assert_eq!(probe.latest_entry_title.as_deref(), Some("Latest headline"));
}

#[tokio::test]
async fn feed_without_entries_fails_the_probe() {
    let fetcher = CannedFetcher {
        xml: Some(EMPTY_FEED),
    };
    let err = probe_feed(&fetcher, "https://probe.example/feed.xml")
        .await
        .unwrap_err();
    assert_eq!(err, ValidationError::NoEntries);
}

#[tokio::test]
async fn unreachable_feed_fails_the_probe() {
    let fetcher = CannedFetcher { xml: None };
    let err = probe_feed(&fetcher, "https://dead.example/feed.xml")
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::Unreachable(_)));
}

#[tokio::test]
async fn bad_url_short_circuits_before_any_fetch() {
    let fetcher = CannedFetcher {
        xml: Some(HEALTHY_FEED),
    };
    let err = probe_feed(&fetcher, "ftp://probe.example/feed.xml")
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::SchemeNotAllowed(_)));
}
