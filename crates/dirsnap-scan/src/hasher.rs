//! Streaming BLAKE3 content hashing.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, unbounded};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use dirsnap_core::ScanError;

/// Read buffer used while streaming file contents into the hasher.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Compute the hex-encoded BLAKE3 digest of a file without loading it whole.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(&mut reader)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hashes many files on a bounded pool of workers.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    concurrency: usize,
}

impl ContentHasher {
    /// Create a hasher that runs at most `concurrency` reads at once.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Hash a set of files in the background.
    ///
    /// Results arrive in completion order, not input order. Files that fail
    /// to hash are logged and left out of the stream.
    pub fn hash_batch(
        &self,
        paths: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<HashStream, ScanError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("dirsnap-hash-{i}"))
            .build()
            .map_err(|e| ScanError::ThreadPool {
                message: e.to_string(),
            })?;

        let (tx, rx) = unbounded();
        let worker_cancel = cancel.clone();

        thread::Builder::new()
            .name("dirsnap-hash-dispatch".into())
            .spawn(move || {
                pool.install(|| {
                    paths.into_par_iter().for_each_with(tx, |tx, path| {
                        if worker_cancel.is_cancelled() {
                            return;
                        }
                        match hash_file(&path) {
                            Ok(hash) => {
                                // The consumer may have stopped listening.
                                let _ = tx.send((path, hash));
                            }
                            Err(err) => {
                                warn!(path = %path.display(), error = %err, "failed to hash file");
                            }
                        }
                    });
                });
            })
            .map_err(|e| ScanError::ThreadPool {
                message: e.to_string(),
            })?;

        Ok(HashStream { rx, cancel })
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(dirsnap_core::default_concurrency())
    }
}

/// Lazy, unordered sequence of `(path, hex digest)` pairs.
///
/// Ends once every worker is done or the token is cancelled.
pub struct HashStream {
    rx: Receiver<(PathBuf, String)>,
    cancel: CancellationToken,
}

impl Iterator for HashStream {
    type Item = (PathBuf, String);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().ok()
    }
}
