//! TTL-bounded, persisted snapshot of the destination folder catalog.
//!
//! The cache has two states: stale (older than the TTL, or never populated)
//! and fresh. It only moves stale -> fresh through an explicit
//! [`IndexCache::refresh`]; staleness itself is a pure time comparison. The
//! pipeline decides once per notification whether to refresh, never
//! mid-resolution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMeta {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    #[serde(rename = "refreshedAt")]
    refreshed_at: DateTime<Utc>,
    index: BTreeMap<String, FolderMeta>,
}

pub struct IndexCache {
    cache_file: PathBuf,
    ttl_hours: i64,
    index: BTreeMap<String, FolderMeta>,
    refreshed_at: DateTime<Utc>,
}

impl IndexCache {
    /// Load the cache from disk. A missing or corrupt file resets to an
    /// empty, stale cache rather than raising; the next refresh repopulates
    /// it.
    pub fn load(cache_file: impl Into<PathBuf>, ttl_hours: i64) -> Self {
        let mut cache = Self {
            cache_file: cache_file.into(),
            ttl_hours,
            index: BTreeMap::new(),
            refreshed_at: DateTime::<Utc>::MIN_UTC,
        };
        cache.load_from_disk();
        cache
    }

    fn load_from_disk(&mut self) {
        let data = match fs::read(&self.cache_file) {
            Ok(data) => data,
            Err(_) => {
                log::info!("no index cache at {}", self.cache_file.display());
                return;
            }
        };

        match serde_json::from_slice::<CacheFile>(&data) {
            Ok(parsed) => {
                log::info!(
                    "loaded index cache ({} folders, refreshed {})",
                    parsed.index.len(),
                    parsed.refreshed_at
                );
                self.index = parsed.index;
                self.refreshed_at = parsed.refreshed_at;
            }
            Err(e) => {
                log::warn!(
                    "index cache at {} is unreadable, resetting: {e}",
                    self.cache_file.display()
                );
                self.index.clear();
                self.refreshed_at = DateTime::<Utc>::MIN_UTC;
            }
        }
    }

    /// Whether the snapshot's age exceeds the TTL. Pure time comparison; no
    /// side effects.
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.refreshed_at > Duration::hours(self.ttl_hours)
    }

    /// Replace the snapshot wholesale and persist it.
    pub fn refresh(&mut self, index: BTreeMap<String, FolderMeta>) -> io::Result<()> {
        self.index = index;
        self.refreshed_at = Utc::now();
        self.save()?;
        log::info!(
            "refreshed index cache ({} folders, ttl {}h)",
            self.index.len(),
            self.ttl_hours
        );
        Ok(())
    }

    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = CacheFile {
            refreshed_at: self.refreshed_at,
            index: self.index.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        fs::write(&self.cache_file, data)
    }

    /// All catalog paths in deterministic (sorted) order.
    pub fn all_paths(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    pub fn find_folder(&self, path: &str) -> Option<&FolderMeta> {
        self.index.get(path)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
