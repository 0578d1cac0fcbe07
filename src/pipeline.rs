//! Notification processing pipeline.
//!
//! Thin orchestration over the core subsystems: parse the notification,
//! acquire and store its documents, resolve the case name to a catalog
//! folder, and upload to the match or to manual review. Acquisition errors
//! abort the notification; an unmatched case name is a normal branch, not an
//! error.

use regex::Regex;
use scraper::Html;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::doc_store::DocumentStore;
use crate::download::DownloadEngine;
use crate::extract;
use crate::index_cache::{FolderMeta, IndexCache};
use crate::matcher::{CaseMatch, FolderMatcher};
use crate::remote::{CatalogSource, Uploader};
use crate::transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Success,
    ManualReview,
    NoWork,
    Error,
}

#[derive(Debug)]
pub struct UploadResult {
    pub status: UploadStatus,
    pub folder_path: Option<String>,
    pub uploaded_files: Vec<String>,
    pub case_match: Option<CaseMatch>,
    pub error: Option<String>,
}

impl UploadResult {
    fn no_work() -> Self {
        UploadResult {
            status: UploadStatus::NoWork,
            folder_path: None,
            uploaded_files: Vec::new(),
            case_match: None,
            error: None,
        }
    }

    fn error(stage: &str, message: impl std::fmt::Display) -> Self {
        let message = format!("{stage}: {message}");
        log::error!("{message}");
        UploadResult {
            status: UploadStatus::Error,
            folder_path: None,
            uploaded_files: Vec::new(),
            case_match: None,
            error: Some(message),
        }
    }
}

pub struct Pipeline<T: HttpTransport> {
    config: Config,
    link_pattern: Regex,
    engine: DownloadEngine<T>,
    store: DocumentStore,
    cache: Mutex<IndexCache>,
    catalog: Box<dyn CatalogSource>,
    uploader: Box<dyn Uploader>,
}

impl<T: HttpTransport> Pipeline<T> {
    pub fn new(
        config: Config,
        transport: T,
        catalog: Box<dyn CatalogSource>,
        uploader: Box<dyn Uploader>,
    ) -> anyhow::Result<Self> {
        let link_pattern = Regex::new(&config.download_link_pattern)?;
        let engine = DownloadEngine::new(transport, config.verification_email.clone());
        let store = DocumentStore::new(config.document_store_dir());
        let cache = Mutex::new(IndexCache::load(config.cache_file(), config.cache_ttl_hours));
        Ok(Self {
            config,
            link_pattern,
            engine,
            store,
            cache,
            catalog,
            uploader,
        })
    }

    /// Process one notification's HTML through the complete pipeline.
    pub async fn process(&self, html: &str) -> UploadResult {
        let (info, case_name) = {
            let document = Html::parse_document(html);
            let info = match extract::extract_download_info(&document, &self.link_pattern) {
                Ok(info) => info,
                Err(e) => return UploadResult::error("notification parsing", e),
            };
            (info, extract::extract_case_name(&document))
        };
        log::info!(
            "parsed notification (lead document {:?}, case name {:?})",
            info.doc_name,
            case_name
        );

        let documents = match self.engine.acquire(&info).await {
            Ok(documents) => documents,
            Err(e) => return UploadResult::error("document acquisition", e),
        };

        let store_dir = match self.store.create_store(info.doc_name.as_deref()) {
            Ok(dir) => dir,
            Err(e) => return UploadResult::error("document store", e),
        };
        let written = match self
            .store
            .write_documents(&store_dir, &documents, info.doc_name.as_deref())
        {
            Ok(written) => written,
            Err(e) => return UploadResult::error("document store", e),
        };
        log::info!(
            "stored {} document(s) under {}",
            written.len(),
            store_dir.display()
        );

        if written.is_empty() {
            log::warn!("no documents to upload after acquisition");
            return UploadResult::no_work();
        }

        let paths = {
            let mut cache = self.cache.lock().await;
            if cache.is_stale() {
                if let Err(e) = self.refresh_catalog(&mut cache).await {
                    return UploadResult::error("catalog refresh", e);
                }
            }
            cache.all_paths()
        };

        let matcher = FolderMatcher::new(self.config.min_match_score);
        let case_match = case_name
            .as_deref()
            .and_then(|name| matcher.find_best_match(name, &paths));

        let (target_folder, status) = match &case_match {
            Some(found) => (found.folder_path.clone(), UploadStatus::Success),
            None => (
                self.config.manual_review_folder.clone(),
                UploadStatus::ManualReview,
            ),
        };

        let mut uploaded = Vec::with_capacity(written.len());
        for (i, local) in written.iter().enumerate() {
            let filename = upload_filename(local, info.doc_name.as_deref(), i, written.len());
            let remote = format!("{target_folder}/{filename}");
            if let Err(e) = self.uploader.upload(local, &remote).await {
                return UploadResult {
                    status: UploadStatus::Error,
                    folder_path: Some(target_folder),
                    uploaded_files: uploaded,
                    case_match,
                    error: Some(format!("upload: {e}")),
                };
            }
            uploaded.push(remote);
        }

        if status == UploadStatus::ManualReview {
            log::warn!(
                "no folder match for case {:?}, sent {} file(s) to manual review",
                case_name,
                uploaded.len()
            );
        } else {
            log::info!("uploaded {} file(s) to {target_folder}", uploaded.len());
        }

        UploadResult {
            status,
            folder_path: Some(target_folder),
            uploaded_files: uploaded,
            case_match,
            error: None,
        }
    }

    /// Resolve a case name against the (refreshed-if-stale) catalog without
    /// touching any documents. Used for dry runs.
    pub async fn resolve_case(&self, case_name: &str) -> anyhow::Result<Option<CaseMatch>> {
        let paths = {
            let mut cache = self.cache.lock().await;
            if cache.is_stale() {
                self.refresh_catalog(&mut cache).await?;
            }
            cache.all_paths()
        };
        let matcher = FolderMatcher::new(self.config.min_match_score);
        Ok(matcher.find_best_match(case_name, &paths))
    }

    async fn refresh_catalog(&self, cache: &mut IndexCache) -> anyhow::Result<()> {
        let entries = self.catalog.list_all_folders().await?;
        let index: BTreeMap<String, FolderMeta> = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.path,
                    FolderMeta {
                        id: entry.id,
                        name: entry.name,
                    },
                )
            })
            .collect();
        cache.refresh(index)?;
        Ok(())
    }
}

/// Destination filename for one stored document. Prefers the lead document
/// name, suffixing an index when the set has more than one file.
fn upload_filename(local: &Path, lead_name: Option<&str>, index: usize, total: usize) -> String {
    match lead_name {
        Some(lead) => {
            let stem = lead.strip_suffix(".pdf").unwrap_or(lead);
            if total > 1 {
                format!("{stem}_{}.pdf", index + 1)
            } else {
                format!("{stem}.pdf")
            }
        }
        None => local
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("document_{}.pdf", index + 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::remote::FolderEntry;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use tempfile::TempDir;

    const ENTRY_URL: &str = "https://illinois.tylertech.cloud/ViewDocuments.aspx?id=abc-123";

    #[derive(Default)]
    struct ScriptedTransport {
        gets: HashMap<String, HttpResponse>,
        request_count: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(&self, url: &str) -> crate::errors::Result<HttpResponse> {
            self.request_count.fetch_add(1, Ordering::SeqCst);
            self.gets
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::Transport {
                    url: url.to_string(),
                    message: "no scripted response".to_string(),
                })
        }

        async fn post(
            &self,
            url: &str,
            _headers: &[(String, String)],
            _body: String,
        ) -> crate::errors::Result<HttpResponse> {
            self.request_count.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Transport {
                url: url.to_string(),
                message: "no scripted response".to_string(),
            })
        }
    }

    struct FakeCatalog {
        entries: Vec<FolderEntry>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for FakeCatalog {
        async fn list_all_folders(&self) -> anyhow::Result<Vec<FolderEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.clone())
        }
    }

    #[derive(Default)]
    struct RecordingUploader {
        uploads: StdMutex<Vec<(PathBuf, String)>>,
    }

    #[async_trait]
    impl Uploader for RecordingUploader {
        async fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<()> {
            self.uploads
                .lock()
                .unwrap()
                .push((local.to_path_buf(), remote.to_string()));
            Ok(())
        }
    }

    fn notification(case_name: &str) -> String {
        format!(
            r#"<html><body>
            <a href="{ENTRY_URL}">View Documents</a>
            <table>
                <tr><td>Case Name</td><td>{case_name}</td></tr>
                <tr><td>Lead Document</td><td>Motion to Dismiss</td></tr>
            </table>
            </body></html>"#
        )
    }

    fn pdf_response() -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/pdf".to_string());
        headers.insert(
            "content-disposition".to_string(),
            r#"attachment; filename="motion.pdf""#.to_string(),
        );
        HttpResponse {
            status: 200,
            headers,
            body: b"%PDF-1.7 fake".to_vec(),
            url: ENTRY_URL.to_string(),
        }
    }

    fn catalog_entries() -> Vec<FolderEntry> {
        vec![
            FolderEntry {
                path: "/Clients/Smith v. Jones".to_string(),
                id: "id:1".to_string(),
                name: "Smith v. Jones".to_string(),
            },
            FolderEntry {
                path: "/Clients/Doe Corp".to_string(),
                id: "id:2".to_string(),
                name: "Doe Corp".to_string(),
            },
        ]
    }

    fn test_config(tmp: &TempDir) -> Config {
        Config {
            min_match_score: 50.0,
            service_dir: tmp.path().join("service"),
            remote_mirror_dir: tmp.path().join("remote"),
            ..Config::default()
        }
    }

    struct Harness {
        pipeline: Pipeline<Arc<ScriptedTransport>>,
        transport: Arc<ScriptedTransport>,
        catalog: Arc<FakeCatalog>,
        uploader: Arc<RecordingUploader>,
    }

    fn harness(tmp: &TempDir, transport: ScriptedTransport) -> Harness {
        let transport = Arc::new(transport);
        let catalog = Arc::new(FakeCatalog {
            entries: catalog_entries(),
            calls: AtomicUsize::new(0),
        });
        let uploader = Arc::new(RecordingUploader::default());
        let pipeline = Pipeline::new(
            test_config(tmp),
            Arc::clone(&transport),
            Box::new(Arc::clone(&catalog)),
            Box::new(Arc::clone(&uploader)),
        )
        .unwrap();
        Harness {
            pipeline,
            transport,
            catalog,
            uploader,
        }
    }

    fn scripted_pdf() -> ScriptedTransport {
        let mut transport = ScriptedTransport::default();
        transport.gets.insert(ENTRY_URL.to_string(), pdf_response());
        transport
    }

    #[tokio::test]
    async fn matched_case_uploads_to_its_folder() {
        let tmp = TempDir::new().unwrap();
        let h = harness(&tmp, scripted_pdf());

        let result = h.pipeline.process(&notification("Smith v Jones")).await;
        assert_eq!(result.status, UploadStatus::Success);
        assert_eq!(
            result.folder_path.as_deref(),
            Some("/Clients/Smith v. Jones")
        );
        assert_eq!(
            result.uploaded_files,
            vec!["/Clients/Smith v. Jones/Motion to Dismiss.pdf".to_string()]
        );
        assert!(result.case_match.unwrap().score >= 50.0);

        let uploads = h.uploader.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].0.exists(), "stored file remains on disk");
    }

    #[tokio::test]
    async fn confidential_case_routes_to_manual_review() {
        let tmp = TempDir::new().unwrap();
        let h = harness(&tmp, scripted_pdf());

        let result = h.pipeline.process(&notification("CONFIDENTIAL")).await;
        assert_eq!(result.status, UploadStatus::ManualReview);
        assert_eq!(result.folder_path.as_deref(), Some("/Manual Review"));
        assert!(result.case_match.is_none());
    }

    #[tokio::test]
    async fn unmatched_case_routes_to_manual_review() {
        let tmp = TempDir::new().unwrap();
        let h = harness(&tmp, scripted_pdf());

        let result = h
            .pipeline
            .process(&notification("Completely Unrelated Matter"))
            .await;
        assert_eq!(result.status, UploadStatus::ManualReview);
        assert_eq!(
            result.uploaded_files,
            vec!["/Manual Review/Motion to Dismiss.pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_download_link_fails_before_any_network_call() {
        let tmp = TempDir::new().unwrap();
        let h = harness(&tmp, ScriptedTransport::default());

        let result = h
            .pipeline
            .process("<html><body><p>nothing here</p></body></html>")
            .await;
        assert_eq!(result.status, UploadStatus::Error);
        assert_eq!(
            h.transport.request_count.load(Ordering::SeqCst),
            0,
            "extraction failure must precede any fetch"
        );
    }

    #[tokio::test]
    async fn acquisition_failure_is_a_pipeline_error() {
        let tmp = TempDir::new().unwrap();
        // Entry URL not scripted: the GET fails as a transport error.
        let h = harness(&tmp, ScriptedTransport::default());

        let result = h.pipeline.process(&notification("Smith v Jones")).await;
        assert_eq!(result.status, UploadStatus::Error);
        assert!(result.error.unwrap().contains("document acquisition"));
        assert!(h.uploader.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn catalog_is_refreshed_once_while_fresh() {
        let tmp = TempDir::new().unwrap();
        let h = harness(&tmp, scripted_pdf());

        let first = h.pipeline.resolve_case("Smith v Jones").await.unwrap();
        assert!(first.is_some());
        let second = h.pipeline.resolve_case("Smith v Jones").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            h.catalog.calls.load(Ordering::SeqCst),
            1,
            "fresh cache must not refetch"
        );
    }
}
