//! Breadth-first directory enumeration.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use dirsnap_core::{ScanOptions, ScanWarning, WarningKind};

use crate::attrs::{filter_needs_metadata, is_excluded};
use crate::progress::{ProgressSink, ProgressThrottle, ScanPhase};

/// Directories found under a root, in discovery order.
#[derive(Debug, Default)]
pub struct CollectedDirs {
    /// Absolute directory paths; the root is always first.
    pub dirs: Vec<PathBuf>,
    /// Directories that could not be enumerated.
    pub warnings: Vec<ScanWarning>,
    /// The walk stopped early because of cancellation.
    pub cancelled: bool,
}

/// Collects every directory under a root with an explicit work queue.
///
/// Each directory is read with a single lazy `read_dir` call. Filtered
/// directories are neither recorded nor descended into, and symlinked
/// directories are not followed.
pub struct DirectoryCollector<'a> {
    options: &'a ScanOptions,
}

impl<'a> DirectoryCollector<'a> {
    /// Create a collector applying the given filters.
    pub fn new(options: &'a ScanOptions) -> Self {
        Self { options }
    }

    /// Walk the tree under `root`.
    ///
    /// Enumeration failures on one directory are logged and treated as
    /// "no subdirectories". Cancellation is polled between directories.
    pub fn collect(
        &self,
        root: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> CollectedDirs {
        let throttle = ProgressThrottle::new(progress, ScanPhase::Collecting);
        let needs_metadata = filter_needs_metadata(self.options);

        let mut collected = CollectedDirs {
            dirs: vec![root.to_path_buf()],
            ..Default::default()
        };
        let mut queue = VecDeque::from([root.to_path_buf()]);

        while let Some(dir) = queue.pop_front() {
            if cancel.is_cancelled() {
                collected.cancelled = true;
                break;
            }

            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "failed to enumerate directory");
                    collected
                        .warnings
                        .push(ScanWarning::from_io(&dir, &err, WarningKind::ReadError));
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(path = %dir.display(), error = %err, "failed to read directory entry");
                        collected
                            .warnings
                            .push(ScanWarning::from_io(&dir, &err, WarningKind::ReadError));
                        continue;
                    }
                };

                match entry.file_type() {
                    Ok(file_type) if file_type.is_dir() => {}
                    Ok(_) => continue,
                    Err(err) => {
                        let path = entry.path();
                        warn!(path = %path.display(), error = %err, "failed to read file type");
                        collected
                            .warnings
                            .push(ScanWarning::from_io(path, &err, WarningKind::MetadataError));
                        continue;
                    }
                }

                let name = entry.file_name();
                let metadata = if needs_metadata {
                    entry.metadata().ok()
                } else {
                    None
                };
                if is_excluded(&name.to_string_lossy(), metadata.as_ref(), self.options) {
                    trace!(path = %entry.path().display(), "skipping filtered directory");
                    continue;
                }

                let path = entry.path();
                collected.dirs.push(path.clone());
                queue.push_back(path);
            }

            throttle.tick("Collecting directories", &dir);
        }

        throttle.finish(
            &format!("Found {} directories", collected.dirs.len()),
            root,
        );
        collected
    }
}
