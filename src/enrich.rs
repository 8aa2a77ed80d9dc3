use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AiSettings;

/// Fixed genre set the classifier must answer from. Colors for these
/// live in the delivery layer.
pub const GENRES: [&str; 8] = [
    "Technology",
    "Business",
    "Entertainment",
    "Sports",
    "Politics",
    "Science",
    "Health",
    "Other",
];

// Output budgets per task. Classification only ever emits a label.
const TRANSLATE_MAX_TOKENS: u32 = 2000;
const SUMMARIZE_MAX_TOKENS: u32 = 1000;
const CLASSIFY_MAX_TOKENS: u32 = 50;

/// The classifier reads at most this much of the body.
const CLASSIFY_EXCERPT_CHARS: usize = 500;

/// What enrichment produced for one article. Every field is optional;
/// a missing value means the consumer falls back to the raw article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub translated_title: Option<String>,
    pub translated_description: Option<String>,
    pub summary: Option<String>,
    pub genre: Option<String>,
}

/// Black-box AI calls. Implementations never error: a failed or
/// unavailable model yields `None` and the pipeline moves on.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn translate(&self, text: &str) -> Option<String>;
    async fn summarize(&self, text: &str, max_chars: usize) -> Option<String>;
    async fn classify_genre(&self, title: &str, description: &str) -> Option<String>;
}

/// Stands in when no model is configured.
pub struct DisabledEnricher;

#[async_trait]
impl Enricher for DisabledEnricher {
    async fn translate(&self, _text: &str) -> Option<String> {
        None
    }

    async fn summarize(&self, _text: &str, _max_chars: usize) -> Option<String> {
        None
    }

    async fn classify_genre(&self, _title: &str, _description: &str) -> Option<String> {
        None
    }
}

/// One round-trip to a text model. Kept private: callers talk to
/// `Enricher`, which owns the prompts and per-task budgets.
#[async_trait]
trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Option<String>;
}

struct OpenAiCompatModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl TextModel for OpenAiCompatModel {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Option<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %self.model, error = %e, "chat completion request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(model = %self.model, status = %response.status(), "chat completion returned error status");
            return None;
        }
        match response.json::<ChatResponse>().await {
            Ok(body) => body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .map(|s| s.trim().to_string()),
            Err(e) => {
                warn!(model = %self.model, error = %e, "unreadable chat completion response");
                None
            }
        }
    }
}

struct GeminiModel {
    client: Client,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: String,
}

#[async_trait]
impl TextModel for GeminiModel {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Option<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
            },
        };

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %self.model, error = %e, "generateContent request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(model = %self.model, status = %response.status(), "generateContent returned error status");
            return None;
        }
        match response.json::<GeminiResponse>().await {
            Ok(body) => body
                .candidates
                .and_then(|mut c| {
                    if c.is_empty() {
                        None
                    } else {
                        Some(c.remove(0))
                    }
                })
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text.trim().to_string()),
            Err(e) => {
                warn!(model = %self.model, error = %e, "unreadable generateContent response");
                None
            }
        }
    }
}

/// Production enricher: one model slot for translation, one for
/// summaries and classification, selected independently by config.
pub struct AiEnricher {
    translator: Option<Box<dyn TextModel>>,
    summarizer: Option<Box<dyn TextModel>>,
    target_language: String,
}

#[async_trait]
impl Enricher for AiEnricher {
    async fn translate(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        let model = self.translator.as_ref()?;
        let prompt = format!(
            "Translate the following text into natural {}. \
             Return only the translation, nothing else.\n\n{}",
            self.target_language, text
        );
        model.complete(&prompt, 0.3, TRANSLATE_MAX_TOKENS).await
    }

    async fn summarize(&self, text: &str, max_chars: usize) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        let model = self.summarizer.as_ref()?;
        let prompt = format!(
            "Summarize the following text in {} in roughly {} characters. \
             Return only the summary, nothing else.\n\n{}",
            self.target_language, max_chars, text
        );
        model.complete(&prompt, 0.3, SUMMARIZE_MAX_TOKENS).await
    }

    async fn classify_genre(&self, title: &str, description: &str) -> Option<String> {
        let model = self.summarizer.as_ref()?;
        let excerpt: String = description.chars().take(CLASSIFY_EXCERPT_CHARS).collect();
        let prompt = format!(
            "Classify this article into exactly one of these genres: {}. \
             Answer with the genre name only.\n\nTitle: {}\nDescription: {}",
            GENRES.join(", "),
            title,
            excerpt
        );
        let answer = model.complete(&prompt, 0.1, CLASSIFY_MAX_TOKENS).await?;
        let trimmed = answer.trim();
        match GENRES.iter().find(|g| g.eq_ignore_ascii_case(trimmed)) {
            Some(genre) => Some((*genre).to_string()),
            // The model wandered off the list; file it under Other
            // rather than inventing a genre.
            None => {
                debug!(answer = %trimmed, "unrecognized genre from model");
                Some("Other".to_string())
            }
        }
    }
}

/// Builds the enricher the settings describe. Model slots come up as
/// unavailable (not errors) when disabled or missing credentials.
pub fn build_enricher(ai: &AiSettings) -> Arc<dyn Enricher> {
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client");

    let translator = build_model(&ai.translation_model, ai, &client);
    let summarizer = build_model(&ai.summary_model, ai, &client);

    if translator.is_none() && summarizer.is_none() {
        info!("AI enrichment disabled");
        return Arc::new(DisabledEnricher);
    }

    Arc::new(AiEnricher {
        translator,
        summarizer,
        target_language: ai.target_language.clone(),
    })
}

fn build_model(name: &str, ai: &AiSettings, client: &Client) -> Option<Box<dyn TextModel>> {
    match name {
        "" | "disabled" => None,
        "gemini" => match env::var("GEMINI_API_KEY") {
            Ok(key) if !key.is_empty() => Some(Box::new(GeminiModel {
                client: client.clone(),
                model: ai.gemini_model.clone(),
                api_key: key,
            })),
            _ => {
                warn!("GEMINI_API_KEY not set, gemini model unavailable");
                None
            }
        },
        // Local OpenAI-compatible servers usually take no key.
        "openai" => Some(Box::new(OpenAiCompatModel {
            client: client.clone(),
            base_url: ai.openai_base_url.clone(),
            model: ai.openai_model.clone(),
            api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
        })),
        other => {
            warn!(model = %other, "unknown model name in config");
            None
        }
    }
}
