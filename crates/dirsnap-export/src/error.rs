//! Error types for snapshot generation.

use std::path::PathBuf;

use thiserror::Error;

use dirsnap_core::ScanError;

/// Errors that abort snapshot generation.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The scan itself failed (missing root, pool start-up).
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The template file could not be read.
    #[error("Failed to load template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template lacks the data marker.
    #[error("Template does not contain the {marker} marker")]
    MissingMarker { marker: &'static str },

    /// The output sink could not be opened.
    #[error("Failed to open output: {source}")]
    OpenOutput {
        #[source]
        source: std::io::Error,
    },

    /// Writing to the output sink failed mid-stream.
    #[error("Failed to write output: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },
}
