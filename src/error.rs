use std::path::PathBuf;

use thiserror::Error;

/// Conditions that abort a run before anything is written.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("document yielded no text after normalization: {}", .0.display())]
    EmptyDocument(PathBuf),

    #[error("no item catalog available; {0} references cannot be resolved")]
    MissingCatalog(usize),

    #[error("invalid pattern in configuration ({field}): {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
}
