//! External capabilities consumed by the pipeline: the folder catalog
//! listing and the upload transport.
//!
//! Both are trait seams so the pipeline can be driven against a real cloud
//! store, the filesystem-backed implementations below, or recording fakes in
//! tests.

use anyhow::Context;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One folder in the destination catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub path: String,
    pub id: String,
    pub name: String,
}

/// Lists every folder in the destination catalog, flattened.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_all_folders(&self) -> anyhow::Result<Vec<FolderEntry>>;
}

/// Uploads one local file to a destination path.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: CatalogSource + ?Sized> CatalogSource for std::sync::Arc<T> {
    async fn list_all_folders(&self) -> anyhow::Result<Vec<FolderEntry>> {
        (**self).list_all_folders().await
    }
}

#[async_trait]
impl<T: Uploader + ?Sized> Uploader for std::sync::Arc<T> {
    async fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<()> {
        (**self).upload(local, remote).await
    }
}

/// Catalog backed by a local directory tree; each subdirectory is one
/// catalog entry with a `/`-separated path rooted at the mirror.
pub struct FsCatalog {
    root: PathBuf,
}

impl FsCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CatalogSource for FsCatalog {
    async fn list_all_folders(&self) -> anyhow::Result<Vec<FolderEntry>> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating catalog root {}", self.root.display()))?;

        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.context("walking catalog root")?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .expect("walked path is under the root");
            let path = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push(FolderEntry {
                id: path.clone(),
                path,
                name,
            });
        }
        Ok(out)
    }
}

/// Uploader that mirrors files into a local directory tree.
pub struct FsUploader {
    root: PathBuf,
}

impl FsUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Uploader for FsUploader {
    async fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<()> {
        let destination = self.root.join(remote.trim_start_matches('/'));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(local, &destination).with_context(|| {
            format!("copying {} to {}", local.display(), destination.display())
        })?;
        log::info!("uploaded {} to {remote}", local.display());
        Ok(())
    }
}
