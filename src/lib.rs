pub mod config;
pub mod doc_store;
pub mod download;
pub mod errors;
pub mod extract;
pub mod index_cache;
pub mod matcher;
pub mod pipeline;
pub mod remote;
pub mod transport;

pub use config::Config;
pub use download::{AcquiredDocument, DownloadEngine};
pub use errors::PipelineError;
pub use matcher::{CaseMatch, FolderMatcher};
pub use pipeline::{Pipeline, UploadResult, UploadStatus};
pub use transport::{HttpTransport, ReqwestTransport};
