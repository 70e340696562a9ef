//! End-to-end snapshot generation: scan, open the sink, render, serialize.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dirsnap_core::ScanOptions;
use dirsnap_scan::{ProgressSink, SnapshotScanner};

use crate::error::ExportError;
use crate::serializer::{SerializeOutcome, SnapshotSerializer};
use crate::template::{Template, TemplateVars};

/// Figures reported after a completed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    /// Directories scanned, the root included.
    pub folders: u64,
    /// Files recorded across all folders.
    pub files: u64,
    /// Sum of all recorded file sizes in bytes.
    pub total_size: u64,
    /// Folder records written to the sink.
    pub records_written: usize,
    /// Bytes written to the sink, header and footer included.
    pub bytes: u64,
    /// Item-local warnings collected during the scan.
    pub warnings: usize,
    /// Wall time from scan start to the last flushed chunk.
    pub duration: Duration,
}

/// Result of a snapshot run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The whole tree was written.
    Completed(SnapshotSummary),
    /// The run stopped early. Records already written stay in the sink.
    Cancelled { records_written: usize },
}

impl SnapshotOutcome {
    /// Whether the run stopped before the footer was written.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Runs a scan and streams its array through a template into a sink.
#[derive(Debug, Clone)]
pub struct SnapshotGenerator {
    options: ScanOptions,
    template: Template,
    title: String,
    serializer: SnapshotSerializer,
}

impl SnapshotGenerator {
    /// Create a generator with an empty title and the default serializer.
    pub fn new(options: ScanOptions, template: Template) -> Self {
        Self {
            options,
            template,
            title: String::new(),
            serializer: SnapshotSerializer::new(),
        }
    }

    /// Set the value of the `[TITLE]` placeholder.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Replace the serializer, e.g. to change the chunk size.
    pub fn with_serializer(mut self, serializer: SnapshotSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Scan options used for every run.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Generate a snapshot into the sink returned by `open`.
    ///
    /// The scan runs first, so a missing root fails before `open` is called
    /// and nothing is written. A scan cancelled before completion never
    /// opens the sink either.
    pub fn generate<W, F>(
        &self,
        open: F,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SnapshotOutcome, ExportError>
    where
        W: Write,
        F: FnOnce() -> io::Result<W>,
    {
        let start = Instant::now();
        let result = SnapshotScanner::new().scan(&self.options, progress, cancel)?;
        if result.cancelled {
            info!(folders = result.folders.len(), "scan cancelled, no snapshot written");
            return Ok(SnapshotOutcome::Cancelled { records_written: 0 });
        }
        if result.has_warnings() {
            debug!(count = result.warnings.len(), "scan finished with warnings");
        }

        let mut sink = open().map_err(|source| ExportError::OpenOutput { source })?;
        let vars = TemplateVars::from_result(self.title.clone(), &result);
        let (header, footer) = self.template.render(&vars);

        let outcome = self
            .serializer
            .write(&result.folders, &header, &footer, &mut sink, progress, cancel)?;

        match outcome {
            SerializeOutcome::Completed { records, bytes } => {
                let summary = SnapshotSummary {
                    folders: result.total_dirs,
                    files: result.total_files,
                    total_size: result.total_size,
                    records_written: records,
                    bytes,
                    warnings: result.warnings.len(),
                    duration: start.elapsed(),
                };
                info!(
                    folders = summary.folders,
                    files = summary.files,
                    bytes = summary.bytes,
                    elapsed_ms = summary.duration.as_millis() as u64,
                    "snapshot written"
                );
                Ok(SnapshotOutcome::Completed(summary))
            }
            SerializeOutcome::Cancelled { records, .. } => {
                info!(records, "snapshot cancelled while writing");
                Ok(SnapshotOutcome::Cancelled {
                    records_written: records,
                })
            }
        }
    }

    /// Generate a snapshot into a file, created or truncated on open.
    pub fn generate_to_file(
        &self,
        path: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SnapshotOutcome, ExportError> {
        self.generate(|| File::create(path), progress, cancel)
    }
}
