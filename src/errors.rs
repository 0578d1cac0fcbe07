use thiserror::Error;

/// Errors raised while turning a notification into stored documents.
///
/// Every variant aborts processing of the current notification. A case name
/// that fails to match a folder is NOT an error; resolution returns `None`
/// and the pipeline routes to manual review instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not find required element in notification: {0}")]
    Extraction(String),

    #[error("missing required ASP.NET field: '{field}'")]
    FormBypass { field: String },

    #[error("received response with unknown content-type '{content_type}' from {url}")]
    UnknownContentType { content_type: String, url: String },

    #[error("exceeded maximum recursion depth ({depth}) at {url}")]
    RecursionLimit { depth: u8, url: String },

    #[error("HTML parsed, but no valid document links were found at {url}")]
    NoLinksFound { url: String },

    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("document store error: {0}")]
    Store(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
