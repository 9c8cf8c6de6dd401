use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the pipeline entry points and the export adapter.
///
/// Statement-level extraction problems are not errors here: they are counted in
/// [`crate::lineage::LineageStats`] and the run continues.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Output(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
