use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration, loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Email address submitted to the provider's verification gate.
    pub verification_email: String,
    /// Anchor hrefs matching this pattern identify the notification's
    /// download link.
    pub download_link_pattern: String,
    /// Minimum fuzzy score (0-100) for a folder match; anything lower routes
    /// to manual review.
    pub min_match_score: f64,
    /// Folder catalog cache time-to-live.
    pub cache_ttl_hours: i64,
    /// Per-call HTTP timeout. There is no overall acquisition deadline.
    pub http_timeout_seconds: u64,
    /// Directory for service state: the index cache and downloaded document
    /// stores.
    pub service_dir: PathBuf,
    /// Local mirror of the remote store used by the filesystem catalog and
    /// uploader.
    pub remote_mirror_dir: PathBuf,
    /// Destination for documents whose case name matched no folder.
    pub manual_review_folder: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verification_email: "eservice@example.com".to_string(),
            download_link_pattern:
                r"^https://illinois\.tylertech\.cloud/ViewDocuments\.aspx\?\w+=[\w-]+".to_string(),
            min_match_score: 70.0,
            cache_ttl_hours: 4,
            http_timeout_seconds: 30,
            service_dir: PathBuf::from("service"),
            remote_mirror_dir: PathBuf::from("remote"),
            manual_review_folder: "/Manual Review".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn cache_file(&self) -> PathBuf {
        self.service_dir.join("index_cache.json")
    }

    pub fn document_store_dir(&self) -> PathBuf {
        self.service_dir.join("tmp")
    }
}
