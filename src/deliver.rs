use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{ConfigStore, Settings};
use crate::enrich::{Enricher, Enrichment};
use crate::types::{Article, CourierError, Result};

const EMBED_DESCRIPTION_LIMIT: usize = 500;

/// Embed accent color per genre; unknown or unclassified gets grey.
pub fn genre_color(genre: Option<&str>) -> u32 {
    match genre {
        Some("Technology") => 0x00ff00,
        Some("Business") => 0x0080ff,
        Some("Entertainment") => 0xff8000,
        Some("Sports") => 0xff0080,
        Some("Politics") => 0x8000ff,
        Some("Science") => 0x00ffff,
        Some("Health") => 0x80ff00,
        _ => 0x808080,
    }
}

/// Seam between the pipeline and the chat platform, so delivery can be
/// recorded instead of sent in tests.
#[async_trait]
pub trait ArticlePoster: Send + Sync {
    async fn post(
        &self,
        webhook_url: &str,
        article: &Article,
        enrichment: &Enrichment,
        feed_name: &str,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct WebhookPayload {
    content: Option<String>,
    embeds: Vec<Embed>,
}

#[derive(Serialize)]
struct Embed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    color: u32,
    timestamp: String,
    fields: Vec<EmbedField>,
    footer: EmbedFooter,
}

#[derive(Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct EmbedFooter {
    text: String,
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn build_embed(article: &Article, enrichment: &Enrichment, feed_name: &str) -> Embed {
    let title = enrichment
        .translated_title
        .clone()
        .unwrap_or_else(|| article.title.clone());

    // Prefer the model summary; otherwise the (possibly translated)
    // feed description, capped at the embed limit.
    let description = enrichment.summary.clone().or_else(|| {
        let raw = enrichment
            .translated_description
            .as_deref()
            .unwrap_or(&article.description);
        if raw.is_empty() {
            None
        } else {
            Some(truncate_chars(raw, EMBED_DESCRIPTION_LIMIT))
        }
    });

    Embed {
        title,
        url: if article.link.is_empty() {
            None
        } else {
            Some(article.link.clone())
        },
        description,
        color: genre_color(enrichment.genre.as_deref()),
        timestamp: Utc::now().to_rfc3339(),
        fields: vec![
            EmbedField {
                name: "Original Title".to_string(),
                value: article.title.clone(),
                inline: false,
            },
            EmbedField {
                name: "Genre".to_string(),
                value: enrichment
                    .genre
                    .clone()
                    .unwrap_or_else(|| "Unclassified".to_string()),
                inline: true,
            },
            EmbedField {
                name: "Feed".to_string(),
                value: if feed_name.is_empty() {
                    article.feed_title.clone()
                } else {
                    feed_name.to_string()
                },
                inline: true,
            },
        ],
        footer: EmbedFooter {
            text: format!("RSS Courier | {}", article.feed_title),
        },
    }
}

pub struct DiscordNotifier {
    client: Client,
    max_retries: u32,
}

impl DiscordNotifier {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            max_retries: 3,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

impl Default for DiscordNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticlePoster for DiscordNotifier {
    async fn post(
        &self,
        webhook_url: &str,
        article: &Article,
        enrichment: &Enrichment,
        feed_name: &str,
    ) -> Result<()> {
        let payload = WebhookPayload {
            content: None,
            embeds: vec![build_embed(article, enrichment, feed_name)],
        };

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut last_error = CourierError::General("webhook post not attempted".to_string());
        for attempt in 0..=self.max_retries {
            match self.client.post(webhook_url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    last_error = CourierError::Status {
                        status: response.status().as_u16(),
                        url: webhook_url.to_string(),
                    };
                }
                Err(e) => {
                    last_error = CourierError::Http(e);
                }
            }
            if attempt < self.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(attempt = attempt + 1, error = %last_error, "webhook post failed, retrying");
                    sleep(delay).await;
                    continue;
                }
            }
            break;
        }
        Err(last_error)
    }
}

/// Routes freshly-found articles through enrichment and out to their
/// feed's destination. Articles arriving here are already marked seen,
/// so a failed post is logged and lost rather than retried next cycle.
pub struct DeliveryPipeline {
    config: Arc<ConfigStore>,
    enricher: Arc<dyn Enricher>,
    poster: Arc<dyn ArticlePoster>,
}

impl DeliveryPipeline {
    pub fn new(
        config: Arc<ConfigStore>,
        enricher: Arc<dyn Enricher>,
        poster: Arc<dyn ArticlePoster>,
    ) -> Self {
        Self {
            config,
            enricher,
            poster,
        }
    }

    /// Delivers everything a check pass found. Returns how many
    /// articles went out. Per-article failures are logged and skipped;
    /// the inter-post delay keeps the webhook under rate limits.
    pub async fn dispatch_all(&self, new_by_feed: HashMap<String, Vec<Article>>) -> usize {
        let settings = self.config.settings();
        let mut posted = 0;

        for (feed_id, articles) in new_by_feed {
            let descriptor = settings.feeds.get(&feed_id);
            let feed_name = descriptor.map(|d| d.name.as_str()).unwrap_or("");
            let webhook = descriptor
                .and_then(|d| settings.destinations.get(&d.destination_id))
                .cloned();

            let Some(webhook) = webhook else {
                warn!(feed = %feed_id, dropped = articles.len(), "no destination configured for feed");
                continue;
            };

            for article in &articles {
                let enrichment = self.enrich_article(article, &settings).await;
                match self
                    .poster
                    .post(&webhook, article, &enrichment, feed_name)
                    .await
                {
                    Ok(()) => {
                        posted += 1;
                        info!(
                            feed = %feed_id,
                            title = %enrichment.translated_title.as_deref().unwrap_or(&article.title),
                            "posted article"
                        );
                        sleep(Duration::from_secs(settings.post_delay_secs)).await;
                    }
                    Err(e) => {
                        warn!(feed = %feed_id, title = %article.title, error = %e, "failed to post article");
                    }
                }
            }
        }
        posted
    }

    async fn enrich_article(&self, article: &Article, settings: &Settings) -> Enrichment {
        let translated_title = self.enricher.translate(&article.title).await;
        let translated_description = self.enricher.translate(&article.description).await;
        let summary = self
            .enricher
            .summarize(
                &format!("{}\n{}", article.title, article.description),
                settings.ai.summary_length,
            )
            .await;
        let genre = self
            .enricher
            .classify_genre(&article.title, &article.description)
            .await;

        Enrichment {
            translated_title,
            translated_description,
            summary,
            genre,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Article {
        Article {
            title: "Original headline".to_string(),
            link: "https://news.example/1".to_string(),
            description: "Something happened".to_string(),
            published: String::new(),
            feed_title: "Example News".to_string(),
            feed_url: "https://news.example/feed.xml".to_string(),
        }
    }

    #[test]
    fn untranslated_title_falls_back_to_the_original() {
        let embed = build_embed(&article(), &Enrichment::default(), "Example News");
        assert_eq!(embed.title, "Original headline");
        assert_eq!(embed.url.as_deref(), Some("https://news.example/1"));
    }

    #[test]
    fn translated_title_wins_when_present() {
        let enrichment = Enrichment {
            translated_title: Some("翻訳された見出し".to_string()),
            ..Enrichment::default()
        };
        let embed = build_embed(&article(), &enrichment, "Example News");
        assert_eq!(embed.title, "翻訳された見出し");
        // the original stays visible in its own field
        assert_eq!(embed.fields[0].value, "Original headline");
    }

    #[test]
    fn long_description_is_cut_at_the_embed_limit() {
        let mut article = article();
        article.description = "あ".repeat(EMBED_DESCRIPTION_LIMIT + 100);

        let embed = build_embed(&article, &Enrichment::default(), "Example News");
        let description = embed.description.unwrap();
        assert_eq!(description.chars().count(), EMBED_DESCRIPTION_LIMIT);
    }

    #[test]
    fn summary_is_preferred_over_the_description() {
        let enrichment = Enrichment {
            summary: Some("short version".to_string()),
            translated_description: Some("ignored".to_string()),
            ..Enrichment::default()
        };
        let embed = build_embed(&article(), &enrichment, "Example News");
        assert_eq!(embed.description.as_deref(), Some("short version"));
    }

    #[test]
    fn empty_description_and_link_are_omitted() {
        let mut article = article();
        article.description = String::new();
        article.link = String::new();

        let embed = build_embed(&article, &Enrichment::default(), "Example News");
        assert!(embed.description.is_none());
        assert!(embed.url.is_none());
    }

    #[test]
    fn unclassified_articles_get_the_placeholder_and_grey() {
        let embed = build_embed(&article(), &Enrichment::default(), "");
        assert_eq!(embed.fields[1].name, "Genre");
        assert_eq!(embed.fields[1].value, "Unclassified");
        assert_eq!(embed.color, 0x808080);
        // blank feed name falls back to the feed's own title
        assert_eq!(embed.fields[2].value, "Example News");
    }

    #[test]
    fn classified_articles_carry_their_genre_color() {
        let enrichment = Enrichment {
            genre: Some("Science".to_string()),
            ..Enrichment::default()
        };
        let embed = build_embed(&article(), &enrichment, "Example News");
        assert_eq!(embed.fields[1].value, "Science");
        assert_eq!(embed.color, 0x00ffff);
    }
}
