//! Scan configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Upper bound for the automatic worker count.
const MAX_DEFAULT_CONCURRENCY: usize = 4;

/// How much effort to spend checking image files.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrityLevel {
    /// No validation; every file reports `Unknown`.
    #[default]
    None,
    /// Compare the leading bytes against known magic numbers.
    SignatureOnly,
    /// Signature check followed by a header parse through the image decoder.
    FullDecode,
}

impl IntegrityLevel {
    /// Whether any validation work is requested.
    pub fn is_enabled(self) -> bool {
        self != IntegrityLevel::None
    }
}

/// Configuration for one snapshot scan. Immutable for the duration of a scan.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanOptions {
    /// Root directory to snapshot.
    pub root: PathBuf,

    /// Exclude entries carrying the hidden attribute (dot-names on Unix).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub skip_hidden: bool,

    /// Exclude entries carrying the system attribute (Windows only).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub skip_system: bool,

    /// Compute a BLAKE3 content hash for every file.
    #[builder(default = "false")]
    #[serde(default)]
    pub enable_hashing: bool,

    /// Image integrity validation level.
    #[builder(default)]
    #[serde(default)]
    pub integrity_level: IntegrityLevel,

    /// Maximum number of directory workers (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub max_concurrency: usize,
}

fn default_true() -> bool {
    true
}

impl ScanOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                Err("Root path cannot be empty".to_string())
            }
            Some(_) => Ok(()),
            None => Err("Root path is required".to_string()),
        }
    }
}

impl ScanOptions {
    /// Create a new options builder.
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::default()
    }

    /// Create options with defaults for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_hidden: true,
            skip_system: true,
            enable_hashing: false,
            integrity_level: IntegrityLevel::None,
            max_concurrency: 0,
        }
    }

    /// Worker count after resolving `0` to the automatic default.
    pub fn effective_concurrency(&self) -> usize {
        match self.max_concurrency {
            0 => default_concurrency(),
            n => n,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new(".")
    }
}

/// `min(available parallelism, 4)`.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_CONCURRENCY)
}
