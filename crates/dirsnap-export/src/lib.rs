//! Snapshot output for dirsnap.
//!
//! This crate turns a [`ScanResult`](dirsnap_core::ScanResult) into the
//! compact folder array consumed by the snapshot viewer:
//!
//! - [`SnapshotSerializer`] encodes folders as `D.p([...])` records with
//!   parent/child index cross-references
//! - [`Template`] splits an output template at the `[DIR DATA]` marker and
//!   fills in the header/footer placeholders
//! - [`SnapshotGenerator`] runs the whole pipeline and reports exactly one
//!   of completion, cancellation or an [`ExportError`]
//!
//! # Example
//!
//! ```rust,no_run
//! use dirsnap_core::ScanOptions;
//! use dirsnap_export::{SnapshotGenerator, SnapshotOutcome, Template};
//! use dirsnap_scan::NoProgress;
//! use tokio_util::sync::CancellationToken;
//!
//! let generator = SnapshotGenerator::new(ScanOptions::new("/data"), Template::builtin()?)
//!     .with_title("Nightly");
//! let outcome = generator.generate_to_file(
//!     "snapshot.html".as_ref(),
//!     &NoProgress,
//!     &CancellationToken::new(),
//! )?;
//! if let SnapshotOutcome::Completed(summary) = outcome {
//!     println!("{} folders written", summary.records_written);
//! }
//! # Ok::<(), dirsnap_export::ExportError>(())
//! ```

mod error;
mod escape;
mod serializer;
mod snapshot;
mod template;

pub use error::ExportError;
pub use escape::{escape_dir_path, escape_name};
pub use serializer::{CHUNK_SIZE, SerializeOutcome, SnapshotSerializer};
pub use snapshot::{SnapshotGenerator, SnapshotOutcome, SnapshotSummary};
pub use template::{DATA_MARKER, DEFAULT_TEMPLATE, Template, TemplateVars};
