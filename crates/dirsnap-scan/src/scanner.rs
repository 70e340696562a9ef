//! Parallel per-directory scan orchestration.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use dashmap::DashMap;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dirsnap_core::{
    IntegrityStatus, ScanError, ScanOptions, ScanResult, ScanWarning, SnappedFile, SnappedFolder,
    WarningKind, lossless_text, path_text, sort_paths,
};

use crate::attrs::{is_excluded, timestamps};
use crate::collector::DirectoryCollector;
use crate::hasher::{ContentHasher, hash_file};
use crate::integrity::{ImageValidator, is_image_path};
use crate::progress::{ProgressSink, ProgressThrottle, ScanPhase};

/// Directory counts at or below this are processed without a worker pool.
pub const SEQUENTIAL_THRESHOLD: usize = 10;

/// A finished folder plus the item-local failures met while building it.
type BuiltFolder = (SnappedFolder, Vec<ScanWarning>);

/// Produces a [`ScanResult`] for one root directory.
#[derive(Debug, Default)]
pub struct SnapshotScanner;

impl SnapshotScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        Self
    }

    /// Perform a full snapshot scan.
    ///
    /// Fails only when the root cannot be resolved or a worker pool cannot
    /// be started. Cancellation yields `Ok` with `cancelled` set and a
    /// prefix of the sorted folder list.
    pub fn scan(
        &self,
        options: &ScanOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ScanResult, ScanError> {
        let start = Instant::now();
        let root = resolve_root(&options.root)?;

        let collected = DirectoryCollector::new(options).collect(&root, progress, cancel);
        let mut warnings = collected.warnings;
        if collected.cancelled {
            info!(root = %root.display(), "scan cancelled while collecting directories");
            return Ok(ScanResult::cancelled(root, warnings, start.elapsed()));
        }

        let mut dirs = collected.dirs;
        sort_paths(&mut dirs);
        debug!(count = dirs.len(), elapsed = ?start.elapsed(), "directories collected");

        let builder = FolderBuilder::new(options, &root);
        let (folders, folder_warnings) = scan_folders(&builder, &dirs, options, progress, cancel)?;
        warnings.extend(folder_warnings);

        let cancelled = cancel.is_cancelled() || folders.len() < dirs.len();
        let result = ScanResult::new(root, folders, cancelled, warnings, start.elapsed());

        info!(
            dirs = result.total_dirs,
            files = result.total_files,
            bytes = result.total_size,
            cancelled = result.cancelled,
            elapsed = ?result.scan_duration,
            "scan finished"
        );
        Ok(result)
    }
}

/// Build every folder and replay them in sorted order.
fn scan_folders(
    builder: &FolderBuilder<'_>,
    dirs: &[PathBuf],
    options: &ScanOptions,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<(Vec<SnappedFolder>, Vec<ScanWarning>), ScanError> {
    let throttle = ProgressThrottle::new(progress, ScanPhase::Scanning);
    let published: DashMap<PathBuf, BuiltFolder> = DashMap::with_capacity(dirs.len());

    let process = |dir: &PathBuf, batch: bool| {
        if cancel.is_cancelled() {
            return;
        }
        // Build outside the map; only the insert touches shared state.
        if let Some(built) = builder.build(dir, batch, cancel) {
            published.insert(dir.clone(), built);
            throttle.tick("Scanning directories", dir);
        }
    };

    if dirs.len() <= SEQUENTIAL_THRESHOLD {
        for dir in dirs {
            if cancel.is_cancelled() {
                break;
            }
            process(dir, true);
        }
    } else {
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.effective_concurrency())
            .thread_name(|i| format!("dirsnap-scan-{i}"))
            .build()
            .map_err(|e| ScanError::ThreadPool {
                message: e.to_string(),
            })?;
        pool.install(|| dirs.par_iter().for_each(|dir| process(dir, false)));
    }

    // Completion order is irrelevant: the sorted list decides the output.
    let mut folders = Vec::with_capacity(dirs.len());
    let mut warnings = Vec::new();
    for dir in dirs {
        match published.remove(dir) {
            Some((_, (folder, folder_warnings))) => {
                folders.push(folder);
                warnings.extend(folder_warnings);
            }
            None => break,
        }
    }

    if let Some(last) = dirs.get(folders.len().saturating_sub(1)) {
        throttle.finish(&format!("Scanned {} directories", folders.len()), last);
    }
    Ok((folders, warnings))
}

/// Resolve the root to an absolute directory path.
fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let resolved = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
    let resolved = strip_verbatim_prefix(resolved);
    if !resolved.is_dir() {
        return Err(ScanError::NotADirectory { path: resolved });
    }
    Ok(resolved)
}

/// `canonicalize` on Windows returns `\\?\C:\...`; keep plain drive paths.
#[cfg(windows)]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    let text = path.to_string_lossy();
    match text.strip_prefix(r"\\?\") {
        Some(rest) if !rest.starts_with("UNC\\") => PathBuf::from(rest),
        _ => path,
    }
}

#[cfg(not(windows))]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    path
}

/// Builds the file list and metadata of one directory.
struct FolderBuilder<'a> {
    options: &'a ScanOptions,
    root: &'a Path,
    hasher: ContentHasher,
    validator: ImageValidator,
}

/// A file that passed the filters, before hashing and validation.
struct PendingFile {
    path: PathBuf,
    file: SnappedFile,
}

impl<'a> FolderBuilder<'a> {
    fn new(options: &'a ScanOptions, root: &'a Path) -> Self {
        Self {
            options,
            root,
            hasher: ContentHasher::new(options.effective_concurrency()),
            validator: ImageValidator::new(options.integrity_level),
        }
    }

    /// Build one folder. Returns `None` if cancelled before completion.
    ///
    /// With `batch` set, hashing and validation of the folder's files run on
    /// the batch pipelines instead of inline.
    fn build(&self, dir: &Path, batch: bool, cancel: &CancellationToken) -> Option<BuiltFolder> {
        let mut warnings = Vec::new();
        let mut folder = self.folder_record(dir, &mut warnings);

        let mut pending = self.list_files(dir, &mut warnings, cancel)?;
        if batch {
            self.enrich_batch(&mut pending, &mut warnings, cancel)?;
        } else {
            self.enrich_inline(&mut pending, &mut warnings, cancel)?;
        }

        folder.files = pending.into_iter().map(|p| p.file).collect();
        folder.sort_files();
        Some((folder, warnings))
    }

    fn folder_record(&self, dir: &Path, warnings: &mut Vec<ScanWarning>) -> SnappedFolder {
        let (modified, created) = match fs::metadata(dir) {
            Ok(metadata) => timestamps(&metadata),
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to read directory metadata");
                warnings.push(ScanWarning::from_io(dir, &err, WarningKind::MetadataError));
                (0, 0)
            }
        };

        if dir == self.root {
            return SnappedFolder::new("", path_text(dir), modified, created);
        }
        let name = dir.file_name().map(lossless_text).unwrap_or_default();
        let parent = dir.parent().map(path_text).unwrap_or_default();
        SnappedFolder::new(name, parent, modified, created)
    }

    /// Enumerate the immediate regular files that pass the filters.
    ///
    /// A directory that cannot be read yields an empty list.
    fn list_files(
        &self,
        dir: &Path,
        warnings: &mut Vec<ScanWarning>,
        cancel: &CancellationToken,
    ) -> Option<Vec<PendingFile>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to list files");
                warnings.push(ScanWarning::from_io(dir, &err, WarningKind::ReadError));
                return Some(Vec::new());
            }
        };

        let mut pending = Vec::new();
        for entry in entries {
            if cancel.is_cancelled() {
                return None;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "failed to read directory entry");
                    warnings.push(ScanWarning::from_io(dir, &err, WarningKind::ReadError));
                    continue;
                }
            };
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let path = entry.path();
            // Follows symlinks; links to directories and special files drop out below.
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read file metadata");
                    warnings.push(ScanWarning::from_io(&path, &err, WarningKind::MetadataError));
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let name = lossless_text(&entry.file_name()).into_owned();
            if is_excluded(&name, Some(&metadata), self.options) {
                continue;
            }

            let (modified, created) = timestamps(&metadata);
            pending.push(PendingFile {
                file: SnappedFile::new(name, metadata.len(), modified, created),
                path,
            });
        }
        Some(pending)
    }

    fn enrich_inline(
        &self,
        pending: &mut [PendingFile],
        warnings: &mut Vec<ScanWarning>,
        cancel: &CancellationToken,
    ) -> Option<()> {
        for item in pending.iter_mut() {
            if cancel.is_cancelled() {
                return None;
            }
            if self.options.enable_hashing {
                match hash_file(&item.path) {
                    Ok(hash) => item.file.hash = hash,
                    Err(err) => {
                        warn!(path = %item.path.display(), error = %err, "failed to hash file");
                        warnings.push(ScanWarning::from_io(&item.path, &err, WarningKind::HashError));
                    }
                }
            }
            if self.validator.level().is_enabled() {
                let status = self.validator.try_validate(&item.path);
                item.file.integrity = integrity_or_warn(&item.path, status, warnings);
            }
        }
        Some(())
    }

    fn enrich_batch(
        &self,
        pending: &mut [PendingFile],
        warnings: &mut Vec<ScanWarning>,
        cancel: &CancellationToken,
    ) -> Option<()> {
        let paths: Vec<PathBuf> = pending.iter().map(|p| p.path.clone()).collect();

        let hashes: HashMap<PathBuf, String> = if self.options.enable_hashing {
            match self.hasher.hash_batch(paths.clone(), cancel.clone()) {
                Ok(stream) => stream.collect(),
                Err(err) => {
                    warn!(error = %err, "hash pool unavailable, hashing inline");
                    return self.enrich_inline(pending, warnings, cancel);
                }
            }
        } else {
            HashMap::new()
        };

        let mut statuses: HashMap<PathBuf, io::Result<IntegrityStatus>> = if self.validator.level().is_enabled() {
            match self.validator.validate_batch(paths, cancel.clone()) {
                Ok(stream) => stream.collect(),
                Err(err) => {
                    warn!(error = %err, "validation pool unavailable, validating inline");
                    return self.enrich_inline(pending, warnings, cancel);
                }
            }
        } else {
            HashMap::new()
        };

        if cancel.is_cancelled() {
            return None;
        }

        for item in pending.iter_mut() {
            if self.options.enable_hashing {
                match hashes.get(&item.path) {
                    Some(hash) => item.file.hash.clone_from(hash),
                    None => warnings.push(ScanWarning::new(
                        &item.path,
                        "content hash could not be computed",
                        WarningKind::HashError,
                    )),
                }
            }
            if self.validator.level().is_enabled() {
                item.file.integrity = match statuses.remove(&item.path) {
                    Some(status) => integrity_or_warn(&item.path, status, warnings),
                    None if !is_image_path(&item.path) => IntegrityStatus::NotAnImage,
                    None => IntegrityStatus::Unknown,
                };
            }
        }
        Some(())
    }
}

/// Unwrap a validation result, recording a read failure as a warning.
fn integrity_or_warn(
    path: &Path,
    status: io::Result<IntegrityStatus>,
    warnings: &mut Vec<ScanWarning>,
) -> IntegrityStatus {
    status.unwrap_or_else(|err| {
        warn!(path = %path.display(), error = %err, "failed to read image for validation");
        warnings.push(ScanWarning::from_io(path, &err, WarningKind::IntegrityError));
        IntegrityStatus::Unknown
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use dirsnap_core::IntegrityLevel;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();

        temp
    }

    fn scan(options: &ScanOptions) -> ScanResult {
        SnapshotScanner::new()
            .scan(options, &NoProgress, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_basic_scan() {
        let temp = create_test_tree();
        let result = scan(&ScanOptions::new(temp.path()));

        assert!(!result.cancelled);
        assert_eq!(result.total_dirs, 4);
        assert_eq!(result.total_files, 4);
        assert_eq!(result.total_size, 5 + 17 + 4 + 17);
        assert!(result.folders[0].is_root());
    }

    #[test]
    fn test_folder_parent_keys() {
        let temp = create_test_tree();
        let result = scan(&ScanOptions::new(temp.path()));
        let root_path = result.folders[0].full_path();

        let dir1 = result.folders.iter().find(|f| f.name == "dir1").unwrap();
        assert_eq!(dir1.path, root_path);
        let subdir = result.folders.iter().find(|f| f.name == "subdir").unwrap();
        assert_eq!(subdir.path, dir1.full_path());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let options = ScanOptions::new(temp.path().join("nope"));
        let err = SnapshotScanner::new()
            .scan(&options, &NoProgress, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_file_root_is_rejected() {
        let temp = create_test_tree();
        let options = ScanOptions::new(temp.path().join("file1.txt"));
        let err = SnapshotScanner::new()
            .scan(&options, &NoProgress, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }

    #[test]
    fn test_hashing_inline_and_batch_agree() {
        let temp = create_test_tree();
        for i in 0..12 {
            fs::create_dir(temp.path().join(format!("extra{i}"))).unwrap();
        }
        let mut options = ScanOptions::new(temp.path());
        options.enable_hashing = true;
        let parallel = scan(&options);

        let small = create_test_tree();
        let mut options = ScanOptions::new(small.path());
        options.enable_hashing = true;
        let sequential = scan(&options);

        let hash_of = |result: &ScanResult, name: &str| {
            result
                .folders
                .iter()
                .flat_map(|f| f.files.iter())
                .find(|f| f.name == name)
                .map(|f| f.hash.clone())
                .unwrap()
        };
        for name in ["file1.txt", "file2.txt", "file3.txt", "file4.txt"] {
            let expected = blake3::hash(
                &fs::read(
                    walk_find(small.path(), name).expect("fixture file present"),
                )
                .unwrap(),
            )
            .to_hex()
            .to_string();
            assert_eq!(hash_of(&sequential, name), expected);
            assert_eq!(hash_of(&parallel, name), expected);
        }
    }

    fn walk_find(dir: &Path, name: &str) -> Option<PathBuf> {
        for entry in fs::read_dir(dir).ok()?.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Some(found) = walk_find(&path, name) {
                    return Some(found);
                }
            } else if entry.file_name() == name {
                return Some(path);
            }
        }
        None
    }

    #[test]
    fn test_image_removed_before_validation_warns() {
        let temp = TempDir::new().unwrap();
        let mut options = ScanOptions::new(temp.path());
        options.integrity_level = IntegrityLevel::SignatureOnly;
        let builder = FolderBuilder::new(&options, temp.path());
        let cancel = CancellationToken::new();

        for batch in [false, true] {
            let path = temp.path().join("gone.png");
            fs::write(&path, "x").unwrap();
            let mut pending = builder.list_files(temp.path(), &mut Vec::new(), &cancel).unwrap();
            fs::remove_file(&path).unwrap();

            let mut warnings = Vec::new();
            if batch {
                builder.enrich_batch(&mut pending, &mut warnings, &cancel).unwrap();
            } else {
                builder.enrich_inline(&mut pending, &mut warnings, &cancel).unwrap();
            }

            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].file.integrity, IntegrityStatus::Unknown);
            assert_eq!(warnings.len(), 1, "batch: {batch}");
            assert_eq!(warnings[0].kind, WarningKind::IntegrityError);
            assert_eq!(warnings[0].path, path);
        }
    }

    #[test]
    fn test_integrity_marks_non_images() {
        let temp = create_test_tree();
        let mut options = ScanOptions::new(temp.path());
        options.integrity_level = IntegrityLevel::SignatureOnly;
        let result = scan(&options);

        assert!(
            result
                .folders
                .iter()
                .flat_map(|f| f.files.iter())
                .all(|f| f.integrity == IntegrityStatus::NotAnImage)
        );
    }

    #[test]
    fn test_cancelled_scan_returns_prefix() {
        let temp = create_test_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = SnapshotScanner::new()
            .scan(&ScanOptions::new(temp.path()), &NoProgress, &cancel)
            .unwrap();
        assert!(result.cancelled);
        assert!(result.folders.is_empty());
    }
}
