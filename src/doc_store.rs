//! Local document store for acquired files.
//!
//! Each notification gets a fresh directory under the store root; directory
//! and file names are sanitized to a restricted character set and every
//! stored file carries a `.pdf` extension.

use std::fs;
use std::path::{Path, PathBuf};

use crate::download::AcquiredDocument;
use crate::errors::Result;

pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a fresh, collision-free directory for one notification's
    /// documents. Named after the lead document when known, otherwise
    /// numbered from the current store population.
    pub fn create_store(&self, suggested: Option<&str>) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;

        let raw = match suggested {
            Some(name) if !name.is_empty() => format!("store_{name}"),
            _ => {
                let count = fs::read_dir(&self.root)?.count();
                format!("store_{}", count + 1)
            }
        };

        let path = self.root.join(sanitize_dir_name(&raw));
        // create_dir (not create_dir_all) so an existing directory is an
        // error rather than silent reuse.
        fs::create_dir(&path)?;
        log::debug!("created document store at {}", path.display());
        Ok(path)
    }

    /// Write every acquired document into `dir`. Unnamed documents fall back
    /// to `{lead}_{index}`; all names are sanitized and normalized to `.pdf`.
    pub fn write_documents(
        &self,
        dir: &Path,
        documents: &[AcquiredDocument],
        lead_name: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(documents.len());

        for (i, document) in documents.iter().enumerate() {
            let raw = match &document.name {
                Some(name) => name.clone(),
                None => format!("{}_{i}", lead_name.unwrap_or("document")),
            };
            let mut path = dir.join(sanitize_file_name(&raw));
            path.set_extension("pdf");

            fs::write(&path, &document.bytes)?;
            log::debug!("wrote {} ({} bytes)", path.display(), document.bytes.len());
            written.push(path);
        }

        Ok(written)
    }
}

/// Alphanumerics plus `. _ -` survive; everything else is dropped.
fn sanitize_dir_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// File names additionally keep spaces.
fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect()
}
