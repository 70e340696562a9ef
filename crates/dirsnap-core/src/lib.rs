//! Core types and configuration for dirsnap.
//!
//! This crate provides the data model shared by the scanning and export
//! crates: scan options, the snapped folder/file records, the scan result
//! container, error types, the deterministic path ordering used to
//! assign array indices and the reversible conversion of OS names to text.

mod config;
mod error;
mod model;
mod ordering;
mod text;

pub use config::{IntegrityLevel, ScanOptions, ScanOptionsBuilder, default_concurrency};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use model::{IntegrityStatus, ScanResult, SnappedFile, SnappedFolder, is_volume_root};
pub use ordering::{ordering_key, sort_paths};
pub use text::{lossless_text, path_text};
