use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::types::Result;

/// Content fingerprint of an article: SHA-256 over `title|link`,
/// truncated to 128 bits, lowercase hex. Description and dates do not
/// participate, so upstream edits to those never resurface an article.
pub fn fingerprint(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(link.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Persistent index of fingerprints already handed to delivery, mapped
/// to the RFC 3339 time they were first seen. Every mutation rewrites
/// the backing JSON file in full (through a temp file), so the state on
/// disk is always complete and hand-editable.
pub struct DedupStore {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, String>>,
}

impl DedupStore {
    /// Opens the store at `path`, loading whatever state is there. A
    /// missing file means an empty index; an unreadable one is logged
    /// and treated as empty rather than taking the process down. If
    /// `path` turns out to be a directory, the store lives in a
    /// `seen_articles.json` inside it.
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let mut path = path.into();
        if path.is_dir() {
            warn!(path = %path.display(), "storage path is a directory, using a file inside it");
            path = path.join("seen_articles.json");
        }
        let map = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt dedup index, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "no dedup index yet, starting empty");
                BTreeMap::new()
            }
        };
        Self {
            path,
            inner: Mutex::new(map),
        }
    }

    pub fn seen(&self, fp: &str) -> bool {
        self.inner
            .lock()
            .expect("dedup mutex poisoned")
            .contains_key(fp)
    }

    /// Idempotent: the first-seen timestamp of an already-known
    /// fingerprint is kept. Persists before returning, so a crash right
    /// after delivery cannot re-announce the article.
    pub fn mark_seen(&self, fp: &str, at: DateTime<Utc>) -> Result<()> {
        let mut map = self.inner.lock().expect("dedup mutex poisoned");
        map.entry(fp.to_string()).or_insert_with(|| at.to_rfc3339());
        persist(&self.path, &map)
    }

    /// Drops entries first seen more than `max_age_days` ago. Entries
    /// whose timestamp does not parse count as expired. Returns how
    /// many were removed.
    pub fn prune(&self, max_age_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let mut map = self.inner.lock().expect("dedup mutex poisoned");
        let before = map.len();
        map.retain(|fp, ts| match DateTime::parse_from_rfc3339(ts) {
            Ok(t) => t.with_timezone(&Utc) >= cutoff,
            Err(_) => {
                debug!(fingerprint = %fp, timestamp = %ts, "dropping entry with unreadable timestamp");
                false
            }
        });
        let removed = before - map.len();
        persist(&self.path, &map)?;
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("dedup mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn persist(path: &Path, map: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(map)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
