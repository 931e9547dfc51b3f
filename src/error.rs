use std::path::PathBuf;
use thiserror::Error;

/// The main error type for annoport operations.
///
/// Only conditions that abort an export before any file is written are
/// errors; per-item problems are collected as warnings on the
/// [`ExportResult`](crate::model::ExportResult) instead.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse export context from {path}: {source}")]
    ContextParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown export format: '{0}'")]
    UnknownFormat(String),

    #[error("Invalid export option: {0}")]
    InvalidOption(String),

    #[error("Exporter format name must not be empty")]
    EmptyFormatName,

    #[error("An exporter named '{0}' is already registered")]
    DuplicateFormat(String),

    #[error("Export to '{format_name}' failed with {error_count} error(s)")]
    ExportFailed {
        format_name: String,
        error_count: usize,
    },
}
