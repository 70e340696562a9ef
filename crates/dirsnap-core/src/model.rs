//! Snapshot records: folders, files and the assembled scan result.

use std::path::{MAIN_SEPARATOR, PathBuf};
use std::time::Duration;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;

/// Outcome of image integrity validation for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegrityStatus {
    /// Validation was not performed.
    #[default]
    Unknown,
    /// The file passed every requested tier.
    Valid,
    /// The leading bytes match no known image signature.
    InvalidSignature,
    /// The signature matched but the container failed to parse.
    DecodeFailed,
    /// The extension is not a recognized image extension.
    NotAnImage,
}

impl IntegrityStatus {
    /// Small ordinal code written into the snapshot array.
    pub fn code(self) -> u8 {
        match self {
            IntegrityStatus::Unknown => 0,
            IntegrityStatus::Valid => 1,
            IntegrityStatus::InvalidSignature => 2,
            IntegrityStatus::DecodeFailed => 3,
            IntegrityStatus::NotAnImage => 4,
        }
    }
}

/// A single file inside a snapped folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnappedFile {
    /// Leaf name, no path.
    pub name: CompactString,
    /// Size in bytes.
    pub size: u64,
    /// Last modification, local seconds since the Unix epoch.
    pub modified: i64,
    /// Creation time, local seconds since the Unix epoch.
    pub created: i64,
    /// Hex content hash, empty when hashing is disabled or failed.
    pub hash: String,
    /// Image integrity status.
    pub integrity: IntegrityStatus,
}

impl SnappedFile {
    /// Create a file record without hash or integrity information.
    pub fn new(name: impl Into<CompactString>, size: u64, modified: i64, created: i64) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
            created,
            hash: String::new(),
            integrity: IntegrityStatus::Unknown,
        }
    }

    /// Attach a content hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Attach an integrity status.
    pub fn with_integrity(mut self, integrity: IntegrityStatus) -> Self {
        self.integrity = integrity;
        self
    }
}

/// One directory of the snapshot.
///
/// `path` is the parent directory as a plain string and is only ever used as
/// a lookup key. The synthetic root entry has an empty `name` and carries
/// its own full path in `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnappedFolder {
    /// Leaf name, empty for the root entry.
    pub name: CompactString,
    /// Parent path (or the root's own path for the root entry).
    pub path: String,
    /// Last modification, local seconds since the Unix epoch.
    pub modified: i64,
    /// Creation time, local seconds since the Unix epoch.
    pub created: i64,
    /// Immediate files, ordered by name.
    pub files: Vec<SnappedFile>,
}

impl SnappedFolder {
    /// Create an empty folder record.
    pub fn new(
        name: impl Into<CompactString>,
        path: impl Into<String>,
        modified: i64,
        created: i64,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            modified,
            created,
            files: Vec::new(),
        }
    }

    /// Whether this is the synthetic root entry.
    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    /// Parent path joined with the name.
    ///
    /// The trailing separator is stripped unless the result is a bare
    /// volume root such as `/` or `C:\`.
    pub fn full_path(&self) -> String {
        let mut full = String::with_capacity(self.path.len() + self.name.len() + 1);
        full.push_str(&self.path);
        if !full.ends_with(MAIN_SEPARATOR) {
            full.push(MAIN_SEPARATOR);
        }
        full.push_str(&self.name);

        if full.ends_with(MAIN_SEPARATOR) && !is_volume_root(&full) {
            full.pop();
        }
        full
    }

    /// Sum of the immediate files' sizes (not recursive).
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Sort files by name in code-point order.
    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Check whether a path string is a bare volume root (`/`, `C:\`, `C:/`).
pub fn is_volume_root(path: &str) -> bool {
    if path == "/" || path == "\\" {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() == 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Complete snapshot of a directory tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root path that was scanned.
    pub root: PathBuf,
    /// Folders in sorted order; position equals array index.
    pub folders: Vec<SnappedFolder>,
    /// Number of folders in `folders`.
    pub total_dirs: u64,
    /// Number of files across all folders.
    pub total_files: u64,
    /// Sum of all file sizes.
    pub total_size: u64,
    /// The scan was cancelled; `folders` is a prefix of the full order.
    pub cancelled: bool,
    /// Item-local failures encountered during the scan.
    pub warnings: Vec<ScanWarning>,
    /// Wall-clock duration of the scan.
    pub scan_duration: Duration,
}

impl ScanResult {
    /// Assemble a result and compute the aggregate counts.
    pub fn new(
        root: PathBuf,
        folders: Vec<SnappedFolder>,
        cancelled: bool,
        warnings: Vec<ScanWarning>,
        scan_duration: Duration,
    ) -> Self {
        let total_dirs = folders.len() as u64;
        let total_files = folders.iter().map(|f| f.files.len() as u64).sum();
        let total_size = folders.iter().map(SnappedFolder::total_size).sum();
        Self {
            root,
            folders,
            total_dirs,
            total_files,
            total_size,
            cancelled,
            warnings,
            scan_duration,
        }
    }

    /// Result of a scan that was cancelled before any folder was built.
    pub fn cancelled(root: PathBuf, warnings: Vec<ScanWarning>, scan_duration: Duration) -> Self {
        Self::new(root, Vec::new(), true, warnings, scan_duration)
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
