//! Directory snapshot scanning engine for dirsnap.
//!
//! # Overview
//!
//! `dirsnap-scan` turns a root directory into an ordered [`ScanResult`]:
//!
//! - **Collection** of every directory with a breadth-first work queue
//! - **Deterministic ordering** of the collected paths
//! - **Parallel per-directory scanning** on a bounded rayon pool
//! - **Optional BLAKE3 hashing** and **two-tier image validation**
//! - **Throttled progress** through an injected [`ProgressSink`]
//! - **Cooperative cancellation** via a `CancellationToken`
//!
//! # Example
//!
//! ```rust,no_run
//! use dirsnap_scan::{NoProgress, ScanOptions, SnapshotScanner};
//! use tokio_util::sync::CancellationToken;
//!
//! let options = ScanOptions::new("/path/to/scan");
//! let result = SnapshotScanner::new()
//!     .scan(&options, &NoProgress, &CancellationToken::new())
//!     .unwrap();
//!
//! println!("{} folders, {} files", result.total_dirs, result.total_files);
//! ```

mod attrs;
mod collector;
mod hasher;
mod integrity;
mod progress;
mod scanner;

pub use collector::{CollectedDirs, DirectoryCollector};
pub use hasher::{ContentHasher, HashStream, hash_file};
pub use integrity::{
    IMAGE_EXTENSIONS, ImageValidator, Validation, ValidationStream, detect_format, is_image_path,
};
pub use progress::{
    BroadcastSink, NoProgress, PROGRESS_INTERVAL, ProgressSink, ProgressThrottle, ScanPhase,
    ScanProgress,
};
pub use scanner::{SEQUENTIAL_THRESHOLD, SnapshotScanner};

// Re-export core types for convenience
pub use dirsnap_core::{
    IntegrityLevel, IntegrityStatus, ScanError, ScanOptions, ScanResult, ScanWarning,
    SnappedFile, SnappedFolder, WarningKind,
};
