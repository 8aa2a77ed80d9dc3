use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::Result;

/// A feed registered for periodic checking. The map key in
/// `Settings::feeds` is the feed id; the orchestrator reads these and
/// never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedDescriptor {
    pub url: String,
    pub name: String,
    /// Key into `Settings::destinations`.
    pub destination_id: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AiSettings {
    /// "gemini", "openai" or "disabled".
    pub translation_model: String,
    pub summary_model: String,
    pub summary_length: usize,
    pub target_language: String,
    pub gemini_model: String,
    /// Base URL of an OpenAI-compatible endpoint, e.g. a local server.
    pub openai_base_url: String,
    pub openai_model: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            translation_model: "disabled".to_string(),
            summary_model: "disabled".to_string(),
            summary_length: 200,
            target_language: "Japanese".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            openai_base_url: "http://localhost:1234/v1".to_string(),
            openai_model: "local-model".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub check_interval_mins: u64,
    pub max_articles_per_feed: usize,
    pub dedup_retention_days: i64,
    /// Pause between posted articles, to stay under chat rate limits.
    pub post_delay_secs: u64,
    /// Pause before retrying after an unexpected cycle error.
    pub error_backoff_secs: u64,
    pub ai: AiSettings,
    pub feeds: BTreeMap<String, FeedDescriptor>,
    /// Destination id -> webhook URL.
    pub destinations: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            check_interval_mins: 15,
            max_articles_per_feed: 10,
            dedup_retention_days: 30,
            post_delay_secs: 2,
            error_backoff_secs: 60,
            ai: AiSettings::default(),
            feeds: BTreeMap::new(),
            destinations: BTreeMap::new(),
        }
    }
}

/// JSON-file settings store. Loading never fails: a missing file gets
/// the defaults written out, an unreadable one is replaced in memory by
/// the defaults with a warning. Every mutation rewrites the whole file.
pub struct ConfigStore {
    path: PathBuf,
    inner: RwLock<Settings>,
}

impl ConfigStore {
    pub fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Settings>(&raw) {
                Ok(s) => s,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
                    Settings::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file, creating defaults");
                let defaults = Settings::default();
                if let Err(e) = write_json(&path, &defaults) {
                    warn!(path = %path.display(), error = %e, "could not write default config");
                }
                defaults
            }
        };
        Self {
            path,
            inner: RwLock::new(settings),
        }
    }

    /// Snapshot of the full settings.
    pub fn settings(&self) -> Settings {
        self.inner.read().expect("config rwlock poisoned").clone()
    }

    pub fn feeds(&self) -> BTreeMap<String, FeedDescriptor> {
        self.inner
            .read()
            .expect("config rwlock poisoned")
            .feeds
            .clone()
    }

    pub fn destination(&self, id: &str) -> Option<String> {
        self.inner
            .read()
            .expect("config rwlock poisoned")
            .destinations
            .get(id)
            .cloned()
    }

    pub fn check_interval(&self) -> Duration {
        let mins = self
            .inner
            .read()
            .expect("config rwlock poisoned")
            .check_interval_mins;
        Duration::from_secs(mins.max(1) * 60)
    }

    pub fn add_feed(&self, id: &str, descriptor: FeedDescriptor) -> Result<()> {
        self.mutate(|s| {
            s.feeds.insert(id.to_string(), descriptor);
        })
    }

    /// Returns whether the feed was present.
    pub fn remove_feed(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        self.mutate(|s| {
            removed = s.feeds.remove(id).is_some();
        })?;
        Ok(removed)
    }

    pub fn set_destination(&self, id: &str, webhook_url: &str) -> Result<()> {
        self.mutate(|s| {
            s.destinations
                .insert(id.to_string(), webhook_url.to_string());
        })
    }

    pub fn set_check_interval_mins(&self, mins: u64) -> Result<()> {
        self.mutate(|s| {
            s.check_interval_mins = mins.max(1);
        })
    }

    fn mutate<F: FnOnce(&mut Settings)>(&self, f: F) -> Result<()> {
        let mut guard = self.inner.write().expect("config rwlock poisoned");
        f(&mut guard);
        write_json(&self.path, &guard)
    }
}

/// Full rewrite through a temp file so a crash mid-write cannot leave a
/// truncated config behind.
fn write_json(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(settings)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
